//! Authentication for the Anthropic API
//!
//! Supports two authentication methods:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN)
//! 2. Anthropic API key (ANTHROPIC_API_KEY, or the configured env var)

use brin_core::{BrinError, Result};
use std::env;

const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Get an authentication token for the Anthropic API
///
/// The OAuth token takes priority; `api_key_env` (default
/// `ANTHROPIC_API_KEY`) is the fallback.
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(oauth_token) = env::var(OAUTH_TOKEN_ENV) {
        tracing::info!("Using {} (subscription)", OAUTH_TOKEN_ENV);
        return Ok(oauth_token);
    }

    if let Ok(api_key) = env::var(api_key_env) {
        tracing::info!("Using {}", api_key_env);
        return Ok(api_key);
    }

    Err(BrinError::Auth(format!(
        "No authentication found. Set either {} or {}.",
        OAUTH_TOKEN_ENV, api_key_env
    )))
}
