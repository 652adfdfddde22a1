//! Login flows for the supported ticketing sites.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::config::{BrowserConfig, Credentials, SiteConfig, SiteId};
use crate::driver::{DriverTimeouts, FormField, PageDriver};

use super::browser::{BrowserAdapter, BrowserSite, LoginFlow};
use super::{SiteAdapter, SiteError};

pub type InterparkSite = BrowserAdapter<InterparkLogin>;
pub type Yes24Site = BrowserAdapter<Yes24Login>;
pub type MelonSite = BrowserAdapter<MelonLogin>;

/// Interpark: `username`/`password` form, generic submit.
///
/// A successful login redirects away from the login page.
pub struct InterparkLogin;

#[async_trait]
impl LoginFlow for InterparkLogin {
    async fn login(&self, site: &BrowserSite, credentials: &Credentials) -> Result<(), SiteError> {
        let fields = [
            FormField::new("input[name='username']", &credentials.username),
            FormField::new("input[name='password']", &credentials.password),
        ];
        site.submit_login(&fields, None).await?;
        ensure_left_login_page(site).await
    }
}

/// Yes24: `userId`/`userPw` form with its own login button.
pub struct Yes24Login;

const YES24_LOGIN_BUTTON: &str = "#btnLogin";

#[async_trait]
impl LoginFlow for Yes24Login {
    async fn login(&self, site: &BrowserSite, credentials: &Credentials) -> Result<(), SiteError> {
        let fields = [
            FormField::new("input[name='userId']", &credentials.username),
            FormField::new("input[name='userPw']", &credentials.password),
        ];
        site.submit_login(&fields, Some(YES24_LOGIN_BUTTON)).await?;
        ensure_left_login_page(site).await
    }
}

/// Melon: `id`/`pw` form. Rejections are rendered inline on the login page.
pub struct MelonLogin;

const MELON_LOGIN_ERROR: &str = ".login_error";

#[async_trait]
impl LoginFlow for MelonLogin {
    async fn login(&self, site: &BrowserSite, credentials: &Credentials) -> Result<(), SiteError> {
        let fields = [
            FormField::new("input[name='id']", &credentials.username),
            FormField::new("input[name='pw']", &credentials.password),
        ];
        site.submit_login(&fields, None).await?;

        let timeouts = site.timeouts();
        let rejected = site
            .driver()
            .element_exists(MELON_LOGIN_ERROR, timeouts.element)
            .await
            .unwrap_or(false);
        if rejected {
            let message = site
                .driver()
                .get_text(MELON_LOGIN_ERROR, timeouts.element)
                .await
                .unwrap_or_default();
            return Err(SiteError::LoginFailed(if message.trim().is_empty() {
                "credentials rejected".to_string()
            } else {
                message.trim().to_string()
            }));
        }
        Ok(())
    }
}

async fn ensure_left_login_page(site: &BrowserSite) -> Result<(), SiteError> {
    let current = site
        .driver()
        .current_url()
        .await
        .map_err(|e| SiteError::LoginFailed(e.to_string()))?;
    debug!("{}: after login at {}", site.site(), current);

    if same_page(&current, site.login_url()) {
        return Err(SiteError::LoginFailed(
            "still on the login page after submitting credentials".to_string(),
        ));
    }
    Ok(())
}

/// Whether two URLs point at the same page: scheme, host, port and path match.
/// Query, fragment and trailing slashes are ignored.
fn same_page(a: &str, b: &str) -> bool {
    page_key(a) == page_key(b)
}

fn page_key(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => format!(
            "{}://{}:{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.port_or_known_default().unwrap_or_default(),
            parsed.path().trim_end_matches('/')
        ),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Build the browser adapter for `site` on top of an open driver session.
pub fn create_browser_adapter(
    site: SiteId,
    config: &SiteConfig,
    browser: &BrowserConfig,
    driver: Arc<dyn PageDriver>,
) -> Arc<dyn SiteAdapter> {
    let inner = BrowserSite::new(
        site,
        driver,
        config.login_url.clone(),
        DriverTimeouts::from_config(browser),
    )
    .with_screenshot_dir(browser.screenshot_dir.clone());

    match site {
        SiteId::Interpark => Arc::new(InterparkSite::new(inner, InterparkLogin)),
        SiteId::Yes24 => Arc::new(Yes24Site::new(inner, Yes24Login)),
        SiteId::Melon => Arc::new(MelonSite::new(inner, MelonLogin)),
    }
}
