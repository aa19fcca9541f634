//! Configuration management for BRIN
//!
//! Loaded from `.brin/config.toml` with documented defaults. Every knob the
//! loop honors (step budget, per-action timeout, failure threshold, history
//! window) lives here rather than being hard-coded.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{BrinError, Result};

/// Top-level BRIN configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrinConfig {
    /// Execution loop parameters
    #[serde(default)]
    pub run: RunConfig,

    /// Browser session and observer parameters
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Model selection
    #[serde(default)]
    pub model: ModelConfig,
}

/// Execution loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum loop iterations before forced termination
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,

    /// Per-action timeout in seconds
    #[serde(default = "default_per_action_timeout")]
    pub per_action_timeout_secs: u64,

    /// Consecutive failures before the run aborts
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: usize,

    /// History entries kept verbatim in the prompt; older ones are summarized
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Bounded retry attempts for the LLM call before giving up
    #[serde(default = "default_llm_max_attempts")]
    pub llm_max_attempts: u32,
}

/// Browser session and page observer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Browser window width
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Browser window height
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Navigation timeout in seconds
    #[serde(default = "default_nav_timeout")]
    pub nav_timeout_secs: u64,

    /// Maximum interactive elements captured per snapshot
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Maximum visible-text characters captured per snapshot
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub default: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

// Default value providers
fn default_step_budget() -> usize {
    25
}

fn default_per_action_timeout() -> u64 {
    15
}

fn default_failure_threshold() -> usize {
    3
}

fn default_history_window() -> usize {
    10
}

fn default_llm_max_attempts() -> u32 {
    3
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_nav_timeout() -> u64 {
    30
}

fn default_max_elements() -> usize {
    50
}

fn default_max_text_chars() -> usize {
    2000
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

impl BrinConfig {
    /// Load configuration from `.brin/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".brin/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| BrinError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.brin/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".brin");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| BrinError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            per_action_timeout_secs: default_per_action_timeout(),
            consecutive_failure_threshold: default_failure_threshold(),
            history_window: default_history_window(),
            llm_max_attempts: default_llm_max_attempts(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            nav_timeout_secs: default_nav_timeout(),
            max_elements: default_max_elements(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}
