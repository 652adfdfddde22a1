//! SMTP email notifier.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::EmailConfig;

use super::{Notifier, NotifyError};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const SUBJECT_PREFIX: &str = "[tickgrab]";

/// Sends notifications as plain-text mail over SMTP with STARTTLS.
///
/// The sender address doubles as the SMTP login.
pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| NotifyError::Rejected(format!("Invalid sender address: {}", e)))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .map_err(|e| NotifyError::Rejected(format!("Invalid recipient address: {}", e)))?;

        let transport = SmtpTransport::starttls_relay(&config.smtp_server)
            .map_err(|e| NotifyError::ConnectionFailed(format!("SMTP relay error: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.sender.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SEND_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn build_message(&self, title: &str, message: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("{} {}", SUBJECT_PREFIX, title))
            .header(ContentType::TEXT_PLAIN)
            .body(format_body(message))
            .map_err(|e| NotifyError::Rejected(format!("Failed to build email: {}", e)))
    }
}

fn format_body(message: &str) -> String {
    format!(
        "{}\n\nSent at: {}",
        message,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let email = self.build_message(title, message)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| NotifyError::ConnectionFailed(format!("Email task failed: {}", e)))?
            .map_err(|e| {
                if e.is_permanent() {
                    NotifyError::Rejected(e.to_string())
                } else {
                    NotifyError::ConnectionFailed(e.to_string())
                }
            })?;

        info!("Email notification sent to {}: {}", self.to, title);
        Ok(())
    }
}
