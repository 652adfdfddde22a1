use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::acquisition::AcquisitionConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub user: Credentials,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub ticketing: TicketingConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub events: Vec<EventTarget>,
}

impl Config {
    /// Look up an event target by id.
    pub fn find_event(&self, id: &str) -> Option<&EventTarget> {
        self.events.iter().find(|e| e.id == id)
    }

    /// The event to acquire: the one named by `id`, or the first configured one.
    pub fn select_event(&self, id: Option<&str>) -> Option<&EventTarget> {
        match id {
            Some(id) => self.find_event(id),
            None => self.events.first(),
        }
    }

    /// Site configuration for an event, falling back to `ticketing.default_site`
    /// when the event does not name one.
    pub fn site_for(&self, event: &EventTarget) -> Option<(SiteId, &SiteConfig)> {
        let site = event.site.unwrap_or(self.ticketing.default_site);
        self.ticketing.sites.get(site.as_str()).map(|cfg| (site, cfg))
    }
}

/// Login credentials for the ticketing site.
///
/// Only handed to the site adapter at login time. `Debug` never prints the password.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// WebDriver browser configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium grid)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// Browser name sent in session capabilities
    #[serde(default = "default_browser_name")]
    pub browser_name: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Page load / navigation timeout in seconds
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
    /// Timeout for single element queries and clicks in milliseconds
    #[serde(default = "default_element_timeout")]
    pub element_timeout_ms: u64,
    /// Directory screenshots are written to on failure
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            headless: false,
            user_agent: None,
            page_timeout_secs: default_page_timeout(),
            element_timeout_ms: default_element_timeout(),
            screenshot_dir: None,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser_name() -> String {
    "chrome".to_string()
}

fn default_page_timeout() -> u64 {
    30
}

fn default_element_timeout() -> u64 {
    5000
}

/// Supported ticketing sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteId {
    Interpark,
    Yes24,
    Melon,
}

impl SiteId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteId::Interpark => "interpark",
            SiteId::Yes24 => "yes24",
            SiteId::Melon => "melon",
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SiteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interpark" => Ok(SiteId::Interpark),
            "yes24" => Ok(SiteId::Yes24),
            "melon" => Ok(SiteId::Melon),
            other => Err(format!("unsupported ticketing site: {}", other)),
        }
    }
}

/// How a site is driven
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteMode {
    /// Page automation through the WebDriver session
    #[default]
    Browser,
    /// Structured HTTP endpoints exposed by the site
    Api,
}

/// Ticketing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketingConfig {
    pub default_site: SiteId,
    /// Site endpoints keyed by site id (`interpark`, `yes24`, `melon`)
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

/// Per-site endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub login_url: String,
    #[serde(default)]
    pub mode: SiteMode,
    /// Base URL of the structured API (required when mode = "api")
    #[serde(default)]
    pub api_url: Option<String>,
    /// HTTP request timeout in seconds for api mode
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u32,
}

fn default_api_timeout() -> u32 {
    30
}

/// Notification configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// SMTP email notification settings (STARTTLS)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Sender address, also used as the SMTP login
    pub sender: String,
    pub password: String,
    pub recipient: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Telegram bot notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    /// Bot API base URL (overridable for self-hosted bot API servers)
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

fn default_true() -> bool {
    true
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// Event journal configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    /// When disabled, events only reach the log and notifiers.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_journal_path(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Log file configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Write a per-run log file next to the console output
    #[serde(default = "default_true")]
    pub file_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_enabled: true,
            dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("tickgrab.db")
}

fn default_buffer_size() -> usize {
    256
}

/// The show to acquire a ticket for. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventTarget {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    /// Site the event is sold on; `ticketing.default_site` when omitted
    #[serde(default)]
    pub site: Option<SiteId>,
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    /// Maximum acceptable price, 0 means no limit
    #[serde(default)]
    pub max_price: u64,
    /// Seat-type tags in order of preference
    #[serde(default)]
    pub preferred_seats: Vec<String>,
}

impl EventTarget {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            artist: None,
            venue: None,
            site: None,
            url: url.into(),
            date: None,
            time: None,
            max_price: 0,
            preferred_seats: Vec::new(),
        }
    }

    pub fn with_preferred_seats<I, S>(mut self, seats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_seats = seats.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_price(mut self, max_price: u64) -> Self {
        self.max_price = max_price;
        self
    }

    pub fn with_site(mut self, site: SiteId) -> Self {
        self.site = Some(site);
        self
    }

    /// Whether `price` is within the configured limit.
    pub fn accepts_price(&self, price: u64) -> bool {
        self.max_price == 0 || price <= self.max_price
    }

    /// Human readable label for logs.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub username: String,
    pub password_configured: bool,
    pub browser: BrowserConfig,
    pub default_site: SiteId,
    pub sites: HashMap<String, SiteConfig>,
    pub acquisition: AcquisitionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<SanitizedEmailConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<SanitizedTelegramConfig>,
    pub journal: JournalConfig,
    pub logging: LoggingConfig,
    pub events: Vec<String>,
}

/// Sanitized email config (SMTP password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedEmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender: String,
    pub recipient: String,
    pub password_configured: bool,
}

/// Sanitized Telegram config (bot token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTelegramConfig {
    pub enabled: bool,
    pub chat_id: String,
    pub bot_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            username: config.user.username.clone(),
            password_configured: !config.user.password.is_empty(),
            browser: config.browser.clone(),
            default_site: config.ticketing.default_site,
            sites: config.ticketing.sites.clone(),
            acquisition: config.acquisition.clone(),
            email: config.notification.email.as_ref().map(|e| SanitizedEmailConfig {
                enabled: e.enabled,
                smtp_server: e.smtp_server.clone(),
                smtp_port: e.smtp_port,
                sender: e.sender.clone(),
                recipient: e.recipient.clone(),
                password_configured: !e.password.is_empty(),
            }),
            telegram: config
                .notification
                .telegram
                .as_ref()
                .map(|t| SanitizedTelegramConfig {
                    enabled: t.enabled,
                    chat_id: t.chat_id.clone(),
                    bot_token_configured: !t.bot_token.is_empty(),
                }),
            journal: config.journal.clone(),
            logging: config.logging.clone(),
            events: config.events.iter().map(|e| e.id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[user]
username = "fan"
password = "hunter2"

[ticketing]
default_site = "interpark"

[ticketing.sites.interpark]
login_url = "https://tickets.example/login"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.user.username, "fan");
        assert_eq!(config.ticketing.default_site, SiteId::Interpark);
        assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
        assert!(!config.browser.headless);
        assert_eq!(config.acquisition.poll_interval_ms, 500);
        assert!(config.events.is_empty());

        let site = &config.ticketing.sites["interpark"];
        assert_eq!(site.mode, SiteMode::Browser);
        assert_eq!(site.timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_missing_user_fails() {
        let toml = r#"
[ticketing]
default_site = "melon"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_events() {
        let toml = format!(
            r#"{}
[[events]]
id = "c-1"
name = "Winter Concert"
site = "yes24"
url = "https://tickets.example/c-1"
date = "2024-12-25"
time = "19:00"
max_price = 150000
preferred_seats = ["VIP", "A"]
"#,
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let event = config.find_event("c-1").unwrap();
        assert_eq!(event.site, Some(SiteId::Yes24));
        assert_eq!(event.preferred_seats, vec!["VIP", "A"]);
        assert_eq!(event.max_price, 150000);
        assert!(config.find_event("c-2").is_none());
    }

    #[test]
    fn test_select_event_defaults_to_first() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.events.push(EventTarget::new("a", "https://x/a"));
        config.events.push(EventTarget::new("b", "https://x/b"));

        assert_eq!(config.select_event(None).unwrap().id, "a");
        assert_eq!(config.select_event(Some("b")).unwrap().id, "b");
        assert!(config.select_event(Some("zzz")).is_none());
    }

    #[test]
    fn test_site_for_falls_back_to_default_site() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let event = EventTarget::new("a", "https://x/a");
        let (site, cfg) = config.site_for(&event).unwrap();
        assert_eq!(site, SiteId::Interpark);
        assert_eq!(cfg.login_url, "https://tickets.example/login");

        let melon_event = event.with_site(SiteId::Melon);
        assert!(config.site_for(&melon_event).is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("fan", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("fan"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_accepts_price() {
        let unlimited = EventTarget::new("a", "u");
        assert!(unlimited.accepts_price(1_000_000));

        let capped = EventTarget::new("a", "u").with_max_price(100);
        assert!(capped.accepts_price(100));
        assert!(!capped.accepts_price(101));
    }

    #[test]
    fn test_site_id_from_str() {
        assert_eq!("Interpark".parse::<SiteId>().unwrap(), SiteId::Interpark);
        assert_eq!("yes24".parse::<SiteId>().unwrap(), SiteId::Yes24);
        assert!("ticketmaster".parse::<SiteId>().is_err());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.notification.telegram = Some(TelegramConfig {
            enabled: true,
            bot_token: "secret-token".to_string(),
            chat_id: "42".to_string(),
            api_url: default_telegram_api(),
        });

        config.notification.email = Some(EmailConfig {
            enabled: true,
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            sender: "bot@example.com".to_string(),
            password: "smtp-secret".to_string(),
            recipient: "fan@example.com".to_string(),
        });

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.password_configured);
        let telegram = sanitized.telegram.as_ref().unwrap();
        assert!(telegram.bot_token_configured);
        assert!(sanitized.email.as_ref().unwrap().password_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("smtp-secret"));
    }

    #[test]
    fn test_email_and_logging_sections() {
        let toml = format!(
            r#"{}
[notification.email]
smtp_server = "smtp.example.com"
sender = "bot@example.com"
password = "pw"
recipient = "fan@example.com"

[logging]
dir = "/var/log/tickgrab"
"#,
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let email = config.notification.email.unwrap();
        assert!(email.enabled);
        assert_eq!(email.smtp_port, 587);
        assert!(config.logging.file_enabled);
        assert_eq!(config.logging.dir, PathBuf::from("/var/log/tickgrab"));
    }

    #[test]
    fn test_logging_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert!(config.logging.file_enabled);
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }
}
