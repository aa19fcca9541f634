//! # brin-engine
//!
//! The BRIN core: a plan-act-observe loop that turns one natural-language
//! instruction into a sequence of typed browser actions.
//!
//! The [`Engine`] is generic over two capability traits, the [`Planner`]
//! (LLM) and the `Driver` (browser, from `brin-browser`), so the whole
//! loop is testable with deterministic scripted stubs.
//!
//! ```no_run
//! use brin_browser::{BrowserSession, CdpDriver};
//! use brin_core::{BrinConfig, Result};
//! use brin_engine::{Engine, LlmPlanner};
//! use brin_llm::{AnthropicClient, Model};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BrinConfig::default();
//!     let session = BrowserSession::launch_with_config(config.browser.clone())?;
//!     let driver = CdpDriver::new(session, &config.run);
//!     let planner = LlmPlanner::new(AnthropicClient::new(Model::Sonnet));
//!
//!     let engine = Engine::new(planner, driver, config.run);
//!     let result = engine.run("go to example.com and extract the page title").await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

mod cancel;
mod engine;
mod extraction;
mod history;
mod planner;

pub use cancel::CancelToken;
pub use engine::Engine;
pub use extraction::ExtractionAssembler;
pub use history::ExecutionHistory;
pub use planner::{build_prompt, parse_decision, Decision, LlmPlanner, PlanContext, Planner};
