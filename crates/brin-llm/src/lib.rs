//! # brin-llm
//!
//! LLM completion capability for the BRIN engine.
//!
//! The planner consumes the [`CompletionClient`] trait; the shipped
//! implementation targets the Anthropic messages API with bounded retry
//! and exponential backoff. Tests substitute scripted stubs, never the
//! live model.

mod auth;
mod client;
mod types;

pub use auth::get_auth_token;
pub use client::{AnthropicClient, CompletionClient};
pub use types::{Completion, Model, Usage};
