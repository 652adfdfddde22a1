use std::collections::HashSet;

use super::{types::Config, ConfigError, SiteId, SiteMode};

/// Validate configuration
/// Currently validates:
/// - Credentials are present
/// - Site keys name a supported site, api mode has an api_url
/// - Acquisition timings are usable (non-zero intervals, payment timeout covers one check)
/// - Every event references a configured site, has a URL and unique id, no blank seat tags
/// - An enabled Telegram notifier has a bot token and chat id
/// - An enabled email notifier has a server, port, sender, password and recipient
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.user.username.trim().is_empty() {
        return Err(invalid("user.username cannot be empty"));
    }
    if config.user.password.is_empty() {
        return Err(invalid("user.password cannot be empty"));
    }

    for (key, site) in &config.ticketing.sites {
        key.parse::<SiteId>().map_err(invalid)?;
        if site.login_url.trim().is_empty() {
            return Err(invalid(format!("ticketing.sites.{}.login_url cannot be empty", key)));
        }
        if site.mode == SiteMode::Api && site.api_url.as_deref().unwrap_or("").is_empty() {
            return Err(invalid(format!(
                "ticketing.sites.{}.api_url is required when mode = \"api\"",
                key
            )));
        }
    }

    let acq = &config.acquisition;
    if acq.poll_interval_ms == 0 {
        return Err(invalid("acquisition.poll_interval_ms cannot be 0"));
    }
    if acq.payment_check_interval_ms == 0 {
        return Err(invalid("acquisition.payment_check_interval_ms cannot be 0"));
    }
    if acq.payment_timeout_ms < acq.payment_check_interval_ms {
        return Err(invalid(
            "acquisition.payment_timeout_ms must be at least payment_check_interval_ms",
        ));
    }
    if acq.interaction_timeout_ms == 0 {
        return Err(invalid("acquisition.interaction_timeout_ms cannot be 0"));
    }

    if let Some(telegram) = config.notification.telegram.as_ref().filter(|t| t.enabled) {
        if telegram.bot_token.trim().is_empty() {
            return Err(invalid("notification.telegram.bot_token cannot be empty"));
        }
        if telegram.chat_id.trim().is_empty() {
            return Err(invalid("notification.telegram.chat_id cannot be empty"));
        }
    }

    if let Some(email) = config.notification.email.as_ref().filter(|e| e.enabled) {
        for (field, value) in [
            ("smtp_server", &email.smtp_server),
            ("sender", &email.sender),
            ("password", &email.password),
            ("recipient", &email.recipient),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("notification.email.{} cannot be empty", field)));
            }
        }
        if email.smtp_port == 0 {
            return Err(invalid("notification.email.smtp_port cannot be 0"));
        }
    }

    let mut seen = HashSet::new();
    for event in &config.events {
        if !seen.insert(event.id.as_str()) {
            return Err(invalid(format!("duplicate event id: {}", event.id)));
        }
        if event.url.trim().is_empty() {
            return Err(invalid(format!("event {} has no url", event.id)));
        }
        if config.site_for(event).is_none() {
            let site = event.site.unwrap_or(config.ticketing.default_site);
            return Err(invalid(format!(
                "event {} uses site {} which has no [ticketing.sites.{}] section",
                event.id, site, site
            )));
        }
        if event.preferred_seats.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid(format!(
                "event {} has an empty preferred seat tag",
                event.id
            )));
        }
    }

    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, EmailConfig, EventTarget, SiteConfig};

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[user]
username = "fan"
password = "pw"

[ticketing]
default_site = "interpark"

[ticketing.sites.interpark]
login_url = "https://interpark.example/login"

[[events]]
id = "c-1"
url = "https://interpark.example/c-1"
preferred_seats = ["VIP"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_empty_password_fails() {
        let mut config = base_config();
        config.user.password.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let mut config = base_config();
        config.acquisition.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_payment_timeout_shorter_than_interval_fails() {
        let mut config = base_config();
        config.acquisition.payment_timeout_ms = 100;
        config.acquisition.payment_check_interval_ms = 1000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_site_key_fails() {
        let mut config = base_config();
        config.ticketing.sites.insert(
            "ticketmaster".to_string(),
            SiteConfig {
                name: None,
                login_url: "https://x/login".to_string(),
                mode: SiteMode::Browser,
                api_url: None,
                timeout_secs: 30,
            },
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_api_mode_requires_api_url() {
        let mut config = base_config();
        if let Some(site) = config.ticketing.sites.get_mut("interpark") {
            site.mode = SiteMode::Api;
        }
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn test_validate_event_on_unconfigured_site_fails() {
        let mut config = base_config();
        config
            .events
            .push(EventTarget::new("c-2", "https://melon.example/c-2").with_site(SiteId::Melon));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("melon"));
    }

    #[test]
    fn test_validate_duplicate_event_ids_fail() {
        let mut config = base_config();
        config
            .events
            .push(EventTarget::new("c-1", "https://interpark.example/other"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_enabled_telegram_needs_chat_id() {
        let mut config = load_config_from_str(
            r#"
[user]
username = "fan"
password = "pw"

[ticketing]
default_site = "interpark"

[ticketing.sites.interpark]
login_url = "https://interpark.example/login"

[notification.telegram]
enabled = true
bot_token = "123:abc"
chat_id = ""
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());

        config.notification.telegram.as_mut().unwrap().enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_enabled_email_needs_recipient() {
        let mut config = base_config();
        config.notification.email = Some(EmailConfig {
            enabled: true,
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            sender: "bot@example.com".to_string(),
            password: "pw".to_string(),
            recipient: " ".to_string(),
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("notification.email.recipient"));

        config.notification.email.as_mut().unwrap().recipient = "fan@example.com".to_string();
        assert!(validate_config(&config).is_ok());

        config.notification.email.as_mut().unwrap().smtp_port = 0;
        assert!(validate_config(&config).is_err());

        config.notification.email.as_mut().unwrap().enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_blank_seat_tag_fails() {
        let mut config = base_config();
        config.events[0].preferred_seats.push("  ".to_string());
        assert!(validate_config(&config).is_err());
    }
}
