//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::TelegramConfig;

use super::{Notifier, NotifyError};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Sends notifications through a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

/// Plain text only. Reasons like `payment_timeout` break Telegram's Markdown parser.
fn format_message(title: &str, message: &str) -> String {
    format!(
        "{}\n\n{}\n\nSent at: {}",
        title,
        message,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format_message(title, message),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("HTTP {}: {}", status, text)));
        }

        info!("Telegram notification sent: {}", title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_token() {
        let notifier = TelegramNotifier::new(&TelegramConfig {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            api_url: "https://api.telegram.org/".to_string(),
        })
        .unwrap();
        assert_eq!(
            notifier.endpoint,
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
        assert_eq!(notifier.chat_id, "42");
    }

    #[test]
    fn test_message_layout() {
        let text = format_message("Ticket secured", "c-1: order o-9");
        assert!(text.starts_with("Ticket secured\n\nc-1: order o-9\n\nSent at: "));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let notifier = TelegramNotifier::new(&TelegramConfig {
            enabled: true,
            bot_token: "t".to_string(),
            chat_id: "1".to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap();
        assert!(notifier.notify("title", "message").await.is_err());
    }
}
