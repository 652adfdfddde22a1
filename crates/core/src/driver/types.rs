//! Types for page driver operations.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while driving a page.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("WebDriver error: {0}")]
    Protocol(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DriverError {
    /// Whether the failure is a timeout (retryable like any other interaction failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}

/// A single form field: CSS selector of the input and the value to type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub selector: String,
    pub value: String,
}

impl FormField {
    pub fn new(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            value: value.into(),
        }
    }
}

/// Page interaction capabilities against one live browser session.
///
/// Every call carries its own timeout; failures come back as `DriverError`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Load `url` in the current window.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Type values into the given inputs, replacing their contents.
    async fn fill_form(&self, fields: &[FormField], timeout: Duration) -> Result<(), DriverError>;

    /// Click the page's submit control.
    async fn submit_form(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Whether at least one element matches `selector`.
    async fn element_exists(&self, selector: &str, timeout: Duration)
        -> Result<bool, DriverError>;

    /// Click the first element matching `selector`. `Ok(false)` if nothing matched.
    async fn click_element(&self, selector: &str, timeout: Duration)
        -> Result<bool, DriverError>;

    /// Wait until an element matching `selector` is present.
    async fn wait_for_element(&self, selector: &str, timeout: Duration)
        -> Result<(), DriverError>;

    /// Visible text of the first element matching `selector`.
    async fn get_text(&self, selector: &str, timeout: Duration) -> Result<String, DriverError>;

    /// Run a synchronous script and return its JSON result.
    async fn execute_script(
        &self,
        script: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, DriverError>;

    /// URL of the current page.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Reload the current page.
    async fn reload(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Save a PNG screenshot of the viewport to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;
}

/// Timeouts used by the site adapters when talking to a driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverTimeouts {
    /// Navigation and form submission.
    pub page: Duration,
    /// Single element queries and clicks.
    pub element: Duration,
}

impl DriverTimeouts {
    pub fn from_config(config: &crate::config::BrowserConfig) -> Self {
        Self {
            page: Duration::from_secs(config.page_timeout_secs),
            element: Duration::from_millis(config.element_timeout_ms),
        }
    }
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            page: Duration::from_secs(30),
            element: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;

    #[test]
    fn test_timeouts_from_config() {
        let config = BrowserConfig {
            page_timeout_secs: 12,
            element_timeout_ms: 750,
            ..Default::default()
        };
        let timeouts = DriverTimeouts::from_config(&config);
        assert_eq!(timeouts.page, Duration::from_secs(12));
        assert_eq!(timeouts.element, Duration::from_millis(750));
    }

    #[test]
    fn test_error_display() {
        let err = DriverError::ElementNotFound(".btn-buy".to_string());
        assert_eq!(err.to_string(), "Element not found: .btn-buy");
        assert!(DriverError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!err.is_timeout());
    }
}
