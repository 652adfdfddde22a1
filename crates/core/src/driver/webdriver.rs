//! W3C WebDriver page driver implementation.
//!
//! Talks the plain HTTP/JSON WebDriver protocol, so any compliant endpoint
//! works (chromedriver, geckodriver, a Selenium grid).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

use super::{DriverError, FormField, PageDriver};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Generic submit control used by `submit_form`.
const SUBMIT_SELECTOR: &str = "input[type='submit'], button[type='submit']";

/// Poll step while waiting for an element to appear.
const WAIT_STEP: Duration = Duration::from_millis(100);

/// Timeout for session housekeeping calls (current URL, screenshot, close).
const SESSION_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

/// WebDriver session client.
pub struct WebDriverClient {
    client: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Open a new browser session on the configured WebDriver endpoint.
    pub async fn connect(config: &BrowserConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        info!(
            "Opening {} session on {} (headless: {})",
            config.browser_name, base_url, config.headless
        );

        let value = send(
            &client,
            Method::POST,
            &format!("{}/session", base_url),
            Some(session_capabilities(config)),
            Duration::from_secs(config.page_timeout_secs.max(30)),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Session("response carried no sessionId".to_string()))?
            .to_string();

        debug!("WebDriver session {} created", session_id);

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    /// End the browser session.
    pub async fn close(&self) -> Result<(), DriverError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        send(&self.client, Method::DELETE, &url, None, SESSION_CALL_TIMEOUT).await?;
        info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        send(&self.client, method, &self.session_url(path), body, timeout).await
    }

    /// Find the first element matching `selector`, `None` if there is none.
    async fn find_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<String>, DriverError> {
        let body = json!({ "using": "css selector", "value": selector });
        match self
            .command(Method::POST, "/element", Some(body), timeout)
            .await
        {
            Ok(value) => element_id(&value)
                .map(Some)
                .ok_or_else(|| DriverError::Protocol("malformed element reference".to_string())),
            Err(DriverError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverClient {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(json!({ "url": url })), timeout)
            .await
            .map_err(|e| match e {
                DriverError::Protocol(msg) => DriverError::Navigation(msg),
                other => other,
            })?;
        Ok(())
    }

    async fn fill_form(&self, fields: &[FormField], timeout: Duration) -> Result<(), DriverError> {
        for field in fields {
            let id = self
                .find_element(&field.selector, timeout)
                .await?
                .ok_or_else(|| DriverError::ElementNotFound(field.selector.clone()))?;
            self.command(
                Method::POST,
                &format!("/element/{}/clear", id),
                Some(json!({})),
                timeout,
            )
            .await?;
            self.command(
                Method::POST,
                &format!("/element/{}/value", id),
                Some(json!({ "text": field.value })),
                timeout,
            )
            .await?;
        }
        Ok(())
    }

    async fn submit_form(&self, timeout: Duration) -> Result<(), DriverError> {
        if self.click_element(SUBMIT_SELECTOR, timeout).await? {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(SUBMIT_SELECTOR.to_string()))
        }
    }

    async fn element_exists(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self
            .command(Method::POST, "/elements", Some(body), timeout)
            .await?;
        Ok(value.as_array().map(|a| !a.is_empty()).unwrap_or(false))
    }

    async fn click_element(&self, selector: &str, timeout: Duration) -> Result<bool, DriverError> {
        let Some(id) = self.find_element(selector, timeout).await? else {
            return Ok(false);
        };
        self.command(
            Method::POST,
            &format!("/element/{}/click", id),
            Some(json!({})),
            timeout,
        )
        .await?;
        debug!("Clicked {}", selector);
        Ok(true)
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::Timeout(timeout));
            }
            if self.find_element(selector, remaining).await?.is_some() {
                return Ok(());
            }
            tokio::time::sleep(WAIT_STEP.min(remaining)).await;
        }
    }

    async fn get_text(&self, selector: &str, timeout: Duration) -> Result<String, DriverError> {
        let id = self
            .find_element(selector, timeout)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))?;
        let value = self
            .command(Method::GET, &format!("/element/{}/text", id), None, timeout)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn execute_script(&self, script: &str, timeout: Duration) -> Result<Value, DriverError> {
        let body = json!({ "script": script, "args": [] });
        self.command(Method::POST, "/execute/sync", Some(body), timeout)
            .await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, "/url", None, SESSION_CALL_TIMEOUT)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError> {
        self.command(Method::POST, "/refresh", Some(json!({})), timeout)
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let value = self
            .command(Method::GET, "/screenshot", None, SESSION_CALL_TIMEOUT)
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot payload is not a string".to_string()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Protocol(format!("invalid screenshot payload: {}", e)))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| DriverError::Io(e.to_string()))?;
        info!("Screenshot saved to {}", path.display());
        Ok(())
    }
}

/// Send one WebDriver command and unwrap the `value` envelope.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    timeout: Duration,
) -> Result<Value, DriverError> {
    let mut request = client.request(method, url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            DriverError::Timeout(timeout)
        } else if e.is_connect() {
            DriverError::ConnectionFailed(e.to_string())
        } else {
            DriverError::Protocol(e.to_string())
        }
    })?;

    let status = response.status();
    let wire: WireResponse = response.json().await.map_err(|e| {
        if e.is_timeout() {
            DriverError::Timeout(timeout)
        } else {
            DriverError::Protocol(format!("HTTP {}: unreadable body: {}", status, e))
        }
    })?;

    if status.is_success() {
        Ok(wire.value)
    } else {
        let err = error_from_value(&wire.value);
        if !matches!(err, DriverError::ElementNotFound(_)) {
            warn!("WebDriver command failed (HTTP {}): {}", status, err);
        }
        Err(err)
    }
}

/// Map a WebDriver error payload (`{"error": ..., "message": ...}`) to a `DriverError`.
fn error_from_value(value: &Value) -> DriverError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code {
        "no such element" | "stale element reference" => DriverError::ElementNotFound(message),
        "timeout" | "script timeout" => DriverError::Timeout(Duration::ZERO),
        "javascript error" => DriverError::Script(message),
        "invalid session id" | "session not created" => DriverError::Session(message),
        _ => DriverError::Protocol(format!("{}: {}", code, message)),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY).and_then(Value::as_str).map(String::from)
}

/// New-session capabilities for the configured browser.
fn session_capabilities(config: &BrowserConfig) -> Value {
    let page_load_ms = config.page_timeout_secs * 1000;

    let mut always_match = json!({
        "browserName": config.browser_name,
        "timeouts": { "pageLoad": page_load_ms },
    });

    if config.browser_name.eq_ignore_ascii_case("firefox") {
        let mut args = Vec::new();
        if config.headless {
            args.push("-headless".to_string());
        }
        let mut prefs = serde_json::Map::new();
        if let Some(ua) = &config.user_agent {
            prefs.insert("general.useragent.override".to_string(), json!(ua));
        }
        always_match["moz:firefoxOptions"] = json!({ "args": args, "prefs": prefs });
    } else {
        let mut args: Vec<String> = [
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-infobars",
            "--disable-extensions",
            "--start-maximized",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if config.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(ua) = &config.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        always_match["goog:chromeOptions"] = json!({ "args": args });
    }

    json!({ "capabilities": { "alwaysMatch": always_match } })
}
