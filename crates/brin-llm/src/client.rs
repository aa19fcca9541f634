//! Anthropic API client behind the `CompletionClient` capability trait
//!
//! The engine only ever sees [`CompletionClient`], so tests substitute a
//! deterministic scripted stub and never touch the live model. The real
//! client retries transient failures (network, 429, 5xx) with exponential
//! backoff, bounded by a configured attempt count; exhaustion is fatal for
//! the run and surfaces as `BrinError::LlmUnavailable`.

use crate::auth;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse, Completion, Model};
use async_trait::async_trait;
use brin_core::{BrinError, Result};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// LLM completion capability
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and return the model's text response
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

/// Completion client for the Anthropic messages API
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    model: Model,
    max_tokens: usize,
    max_attempts: u32,
    api_key_env: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the bounded retry attempt count
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the environment variable holding the API key
    pub fn with_api_key_env(mut self, api_key_env: impl Into<String>) -> Self {
        self.api_key_env = api_key_env.into();
        self
    }

    async fn send_once(&self, auth_token: &str, request: &AnthropicRequest) -> Result<Completion> {
        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", auth_token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| BrinError::Api(format!("Failed to send request: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            // Transient; honor retry-after when the server sends one
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(BrinError::Api(format!(
                "Transient API error {} (retry-after: {:?}): {}",
                status, retry_after, error_text
            )));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(BrinError::LlmUnavailable(format!(
                "Anthropic API error {}: {}",
                status, error_text
            )));
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| BrinError::Api(format!("Failed to parse response: {}", e)))?;

        let text = anthropic_response
            .content
            .first()
            .ok_or_else(|| BrinError::Api("No content in response".to_string()))?
            .text
            .clone();

        Ok(Completion {
            text,
            usage: anthropic_response.usage,
        })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let auth_token = auth::get_auth_token(&self.api_key_env)?;

        let request = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let mut backoff_secs = INITIAL_BACKOFF_SECS;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            tracing::debug!("Sending request to Anthropic API (attempt {})", attempt);

            match self.send_once(&auth_token, &request).await {
                Ok(completion) => {
                    if let Some(usage) = &completion.usage {
                        tracing::info!(
                            "Completion received ({} chars, {} input tokens, {} output tokens)",
                            completion.text.len(),
                            usage.input_tokens,
                            usage.output_tokens
                        );
                    }
                    return Ok(completion);
                }
                // Auth and hard API errors are not retried
                Err(err @ (BrinError::Auth(_) | BrinError::LlmUnavailable(_))) => return Err(err),
                Err(BrinError::Api(message)) => {
                    last_error = message;
                    if attempt < self.max_attempts {
                        tracing::warn!(
                            "LLM call failed ({}). Waiting {}s before retry {}/{}",
                            last_error,
                            backoff_secs,
                            attempt + 1,
                            self.max_attempts
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(BrinError::LlmUnavailable(format!(
            "LLM call failed after {} attempts. Last error: {}",
            self.max_attempts, last_error
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = AnthropicClient::new(Model::Opus)
            .with_max_tokens(8000)
            .with_max_attempts(5);
        assert_eq!(client.model, Model::Opus);
        assert_eq!(client.max_tokens, 8000);
        assert_eq!(client.max_attempts, 5);
    }

    #[test]
    fn test_max_attempts_floor() {
        let client = AnthropicClient::new(Model::Sonnet).with_max_attempts(0);
        assert_eq!(client.max_attempts, 1);
    }
}
