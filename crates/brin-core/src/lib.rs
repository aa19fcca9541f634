//! # brin-core
//!
//! Core types for BRIN, an LLM-driven browser automation engine.
//!
//! A run takes one natural-language instruction and drives a single browser
//! page through a plan-act-observe loop. This crate holds the vocabulary
//! shared by every layer:
//!
//! - [`Action`]: the typed browser operations a planner may emit
//! - [`Outcome`]: the typed result of executing one action
//! - [`PageSnapshot`]: the bounded structural summary used for grounding
//! - [`HistoryEntry`] / [`RunResult`]: the per-run execution record
//! - [`BrinConfig`]: configuration with documented defaults

mod config;
mod error;
mod types;

pub use config::{BrinConfig, BrowserConfig, ModelConfig, RunConfig};
pub use error::{BrinError, Result};
pub use types::*;
