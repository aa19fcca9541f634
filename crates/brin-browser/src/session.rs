//! Browser lifecycle management using Chrome DevTools Protocol
//!
//! All methods here are synchronous CDP calls; the driver wraps them in
//! blocking tasks so per-action timeouts can fire without stalling the
//! runtime.

use brin_core::{BrinError, BrowserConfig, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long a selector may take to appear before an action fails with
/// `ElementNotFound`; well under the per-action timeout
const ELEMENT_WAIT: Duration = Duration::from_secs(2);

/// Active browser session with Chrome DevTools Protocol
///
/// Owns one browser and one tab for the lifetime of a run. The underlying
/// process is cleaned up on drop, so the handle is released on every exit
/// path.
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    /// The single page this run drives
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a new browser instance with default configuration
    pub fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default())
    }

    /// Launch browser with custom configuration
    pub fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .build()
            .map_err(|e| BrinError::Browser(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| BrinError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| BrinError::Browser(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.nav_timeout_secs));

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    /// Connect to an existing browser instance
    ///
    /// # Arguments
    /// * `port` - Chrome DevTools Protocol port (typically 9222)
    pub fn connect(port: u16) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let browser = Browser::connect(format!("http://127.0.0.1:{}", port))
            .map_err(|e| BrinError::Browser(format!("Failed to connect to browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| BrinError::Browser(format!("Failed to create tab: {}", e)))?;

        let config = BrowserConfig::default();
        tab.set_default_timeout(Duration::from_secs(config.nav_timeout_secs));

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    /// Navigate to a URL and wait for the page to settle
    pub fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        self.tab
            .navigate_to(url)
            .map_err(|e| BrinError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| BrinError::Browser(format!("Navigation failed for {}: {}", url, e)))?;

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    /// Execute JavaScript in the page context
    pub fn evaluate_script(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrinError::Browser(format!("JavaScript evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Click an element by CSS selector
    pub fn click(&self, selector: &str) -> Result<()> {
        let element = self.find_element(selector)?;
        element
            .click()
            .map_err(|e| BrinError::Browser(format!("Failed to click {}: {}", selector, e)))?;
        Ok(())
    }

    /// Type text into an element by CSS selector
    pub fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.find_element(selector)?;
        element
            .click()
            .map_err(|e| BrinError::Browser(format!("Failed to focus {}: {}", selector, e)))?;
        element
            .type_into(text)
            .map_err(|e| BrinError::Browser(format!("Failed to type into {}: {}", selector, e)))?;
        Ok(())
    }

    /// Get text content of an element by CSS selector
    pub fn text_of(&self, selector: &str) -> Result<String> {
        let element = self.find_element(selector)?;
        element
            .get_inner_text()
            .map_err(|e| BrinError::Browser(format!("Failed to read text of {}: {}", selector, e)))
    }

    /// Observer/driver configuration this session was launched with
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Locate an element, waiting briefly for late-rendering content
    /// before reporting it missing
    fn find_element(&self, selector: &str) -> Result<headless_chrome::Element<'_>> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, ELEMENT_WAIT)
            .map_err(|_e| BrinError::ElementNotFound(selector.to_string()))
    }

    /// Close the browser session
    pub fn close(self) -> Result<()> {
        info!("Closing browser session");
        // Browser is dropped and cleaned up automatically
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}
