//! Unified error types for BRIN

use thiserror::Error;

/// Unified error type for all BRIN operations
#[derive(Error, Debug)]
pub enum BrinError {
    // LLM errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM unavailable after bounded retry: {0}")]
    LlmUnavailable(String),

    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    // Planner errors
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    // Extraction errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using BrinError
pub type Result<T> = std::result::Result<T, BrinError>;
