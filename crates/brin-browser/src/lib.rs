//! # brin-browser
//!
//! Browser capability for the BRIN engine, built on Chrome DevTools
//! Protocol via `headless_chrome`.
//!
//! - [`BrowserSession`]: browser/tab lifecycle for a single run
//! - [`PageObserver`]: bounded structural snapshots for planner grounding
//! - [`Driver`] / [`CdpDriver`]: executes one typed action at a time with a
//!   per-action timeout
//!
//! # Requirements
//!
//! Chrome or Chromium installed. To reuse an existing browser:
//! `chrome --remote-debugging-port=9222` and [`BrowserSession::connect`].

mod driver;
mod observer;
mod session;

pub use driver::{CdpDriver, Driver};
pub use observer::PageObserver;
pub use session::BrowserSession;
