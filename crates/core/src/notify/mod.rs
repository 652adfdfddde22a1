//! Out-of-band notifications for notable run events.

mod email;
mod telegram;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::NotificationConfig;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Request timeout")]
    Timeout,
}

/// A channel that can deliver short messages to a human.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Build every enabled notifier from configuration.
pub fn create_notifiers(config: &NotificationConfig) -> Result<Vec<Arc<dyn Notifier>>, NotifyError> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(email) = config.email.as_ref().filter(|e| e.enabled) {
        notifiers.push(Arc::new(EmailNotifier::new(email)?));
    }
    if let Some(telegram) = config.telegram.as_ref().filter(|t| t.enabled) {
        notifiers.push(Arc::new(TelegramNotifier::new(telegram)?));
    }

    Ok(notifiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailConfig, TelegramConfig};

    fn telegram(enabled: bool) -> TelegramConfig {
        TelegramConfig {
            enabled,
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            api_url: "https://api.telegram.org".to_string(),
        }
    }

    fn email(enabled: bool) -> EmailConfig {
        EmailConfig {
            enabled,
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            sender: "bot@example.com".to_string(),
            password: "pw".to_string(),
            recipient: "fan@example.com".to_string(),
        }
    }

    #[test]
    fn test_no_notifiers_by_default() {
        let notifiers = create_notifiers(&NotificationConfig::default()).unwrap();
        assert!(notifiers.is_empty());
    }

    #[test]
    fn test_enabled_telegram() {
        let config = NotificationConfig {
            email: None,
            telegram: Some(telegram(true)),
        };
        let notifiers = create_notifiers(&config).unwrap();
        assert_eq!(notifiers.len(), 1);
        assert_eq!(notifiers[0].name(), "telegram");
    }

    #[test]
    fn test_disabled_telegram_is_skipped() {
        let config = NotificationConfig {
            email: None,
            telegram: Some(telegram(false)),
        };
        assert!(create_notifiers(&config).unwrap().is_empty());
    }

    #[test]
    fn test_email_and_telegram_fan_out() {
        let config = NotificationConfig {
            email: Some(email(true)),
            telegram: Some(telegram(true)),
        };
        let notifiers = create_notifiers(&config).unwrap();
        let names: Vec<&str> = notifiers.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["email", "telegram"]);
    }

    #[test]
    fn test_disabled_email_is_skipped() {
        let config = NotificationConfig {
            email: Some(email(false)),
            telegram: None,
        };
        assert!(create_notifiers(&config).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_email_sender_fails_setup() {
        let mut bad = email(true);
        bad.sender = "nope".to_string();
        let config = NotificationConfig {
            email: Some(bad),
            telegram: None,
        };
        assert!(create_notifiers(&config).is_err());
    }
}
