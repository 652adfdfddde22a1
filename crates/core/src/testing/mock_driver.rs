//! Mock page driver for testing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::driver::{DriverError, FormField, PageDriver};

/// Mock implementation of the PageDriver trait.
///
/// Pages are modelled as sets of selectors: present ones, clickable ones
/// (also present) and failing ones (every query errors). All interactions
/// are recorded for assertions.
#[derive(Debug, Default)]
pub struct MockPageDriver {
    present: Arc<RwLock<HashSet<String>>>,
    clickable: Arc<RwLock<HashSet<String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    texts: Arc<RwLock<HashMap<String, String>>>,
    scripts: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    unreachable: Arc<RwLock<HashSet<String>>>,
    /// Overrides the URL reported by `current_url`.
    current_url: Arc<RwLock<Option<String>>>,

    navigations: Arc<RwLock<Vec<String>>>,
    fills: Arc<RwLock<Vec<FormField>>>,
    submits: Arc<RwLock<usize>>,
    clicks: Arc<RwLock<Vec<String>>>,
    existence_checks: Arc<RwLock<Vec<String>>>,
    screenshots: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockPageDriver {
    /// Create a driver showing an empty page.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Page setup
    // =========================================================================

    pub async fn set_present(&self, selector: &str) {
        self.present.write().await.insert(selector.to_string());
    }

    pub async fn set_clickable(&self, selector: &str) {
        self.set_present(selector).await;
        self.clickable.write().await.insert(selector.to_string());
    }

    /// Every query against `selector` returns a script error.
    pub async fn set_failing(&self, selector: &str) {
        self.failing.write().await.insert(selector.to_string());
    }

    pub async fn set_text(&self, selector: &str, text: &str) {
        self.texts
            .write()
            .await
            .insert(selector.to_string(), text.to_string());
    }

    pub async fn set_script_result(&self, script: &str, value: serde_json::Value) {
        self.scripts.write().await.insert(script.to_string(), value);
    }

    pub async fn set_current_url(&self, url: &str) {
        *self.current_url.write().await = Some(url.to_string());
    }

    /// Navigations to `url` fail.
    pub async fn fail_navigation(&self, url: &str) {
        self.unreachable.write().await.insert(url.to_string());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn navigations(&self) -> Vec<String> {
        self.navigations.read().await.clone()
    }

    pub async fn fills(&self) -> Vec<FormField> {
        self.fills.read().await.clone()
    }

    pub async fn submits(&self) -> usize {
        *self.submits.read().await
    }

    /// Selectors passed to `click_element`, in order.
    pub async fn clicks(&self) -> Vec<String> {
        self.clicks.read().await.clone()
    }

    /// Selectors passed to `element_exists`, in order.
    pub async fn existence_checks(&self) -> Vec<String> {
        self.existence_checks.read().await.clone()
    }

    pub async fn screenshots(&self) -> Vec<PathBuf> {
        self.screenshots.read().await.clone()
    }

    async fn check_failing(&self, selector: &str) -> Result<(), DriverError> {
        if self.failing.read().await.contains(selector) {
            return Err(DriverError::Script(format!("mock failure for {}", selector)));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockPageDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.navigations.write().await.push(url.to_string());
        if self.unreachable.read().await.contains(url) {
            return Err(DriverError::Navigation(format!("{} unreachable", url)));
        }
        Ok(())
    }

    async fn fill_form(&self, fields: &[FormField], _timeout: Duration) -> Result<(), DriverError> {
        for field in fields {
            self.check_failing(&field.selector).await?;
        }
        self.fills.write().await.extend_from_slice(fields);
        Ok(())
    }

    async fn submit_form(&self, _timeout: Duration) -> Result<(), DriverError> {
        *self.submits.write().await += 1;
        Ok(())
    }

    async fn element_exists(&self, selector: &str, _timeout: Duration) -> Result<bool, DriverError> {
        self.existence_checks
            .write()
            .await
            .push(selector.to_string());
        self.check_failing(selector).await?;
        Ok(self.present.read().await.contains(selector))
    }

    async fn click_element(&self, selector: &str, _timeout: Duration) -> Result<bool, DriverError> {
        self.clicks.write().await.push(selector.to_string());
        self.check_failing(selector).await?;
        Ok(self.clickable.read().await.contains(selector))
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        self.check_failing(selector).await?;
        if self.present.read().await.contains(selector) {
            Ok(())
        } else {
            Err(DriverError::Timeout(timeout))
        }
    }

    async fn get_text(&self, selector: &str, _timeout: Duration) -> Result<String, DriverError> {
        self.check_failing(selector).await?;
        self.texts
            .read()
            .await
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
    }

    async fn execute_script(
        &self,
        script: &str,
        _timeout: Duration,
    ) -> Result<serde_json::Value, DriverError> {
        self.check_failing(script).await?;
        Ok(self
            .scripts
            .read()
            .await
            .get(script)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        if let Some(url) = self.current_url.read().await.clone() {
            return Ok(url);
        }
        Ok(self
            .navigations
            .read()
            .await
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.screenshots.write().await.push(path.to_path_buf());
        Ok(())
    }
}
