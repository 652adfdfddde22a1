//! Browser-driven site adapter shared by all HTML ticketing sites.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::acquisition::{scan_indicators, AvailabilityIndicator};
use crate::config::{Credentials, SiteId};
use crate::driver::{DriverTimeouts, FormField, PageDriver};

use super::{SiteAdapter, SiteError};

/// CSS selectors a site uses for the purchase flow.
#[derive(Debug)]
pub struct SiteSelectors {
    /// Checked in order; the first match means seats are purchasable.
    pub availability: &'static [AvailabilityIndicator],
    /// Attribute carrying the seat-type tag on seat elements.
    pub seat_attribute: &'static str,
    /// Any seat that can still be clicked.
    pub any_seat: &'static str,
    /// Purchase controls, tried in order.
    pub confirm: &'static [&'static str],
    /// Present once payment has gone through.
    pub payment_success: &'static str,
    /// Element holding the order number on the success page.
    pub order_number: Option<&'static str>,
}

/// Markup shared by the supported sites.
pub const DEFAULT_SELECTORS: SiteSelectors = SiteSelectors {
    availability: &[
        AvailabilityIndicator::Selector(".ticket-available"),
        AvailabilityIndicator::Selector(".btn-buy"),
        AvailabilityIndicator::Selector("[data-status='available']"),
        AvailabilityIndicator::Selector(".seat-available"),
    ],
    seat_attribute: "data-seat-type",
    any_seat: ".seat-available",
    confirm: &[".btn-purchase", ".btn-buy", "[data-action='purchase']"],
    payment_success: ".payment-success",
    order_number: Some(".order-number"),
};

/// One browser session bound to one site.
pub struct BrowserSite {
    site: SiteId,
    driver: Arc<dyn PageDriver>,
    login_url: String,
    timeouts: DriverTimeouts,
    screenshot_dir: Option<PathBuf>,
    selectors: &'static SiteSelectors,
}

impl BrowserSite {
    pub fn new(
        site: SiteId,
        driver: Arc<dyn PageDriver>,
        login_url: impl Into<String>,
        timeouts: DriverTimeouts,
    ) -> Self {
        Self {
            site,
            driver,
            login_url: login_url.into(),
            timeouts,
            screenshot_dir: None,
            selectors: &DEFAULT_SELECTORS,
        }
    }

    pub fn with_screenshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.screenshot_dir = dir;
        self
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn timeouts(&self) -> DriverTimeouts {
        self.timeouts
    }

    /// Open the login page, type the credentials and press `submit`.
    ///
    /// `submit` of `None` uses the page's generic submit control.
    pub async fn submit_login(
        &self,
        fields: &[FormField],
        submit: Option<&str>,
    ) -> Result<(), SiteError> {
        self.driver
            .navigate(&self.login_url, self.timeouts.page)
            .await
            .map_err(|e| SiteError::LoginFailed(format!("cannot open login page: {}", e)))?;

        self.driver
            .fill_form(fields, self.timeouts.element)
            .await
            .map_err(|e| SiteError::LoginFailed(format!("cannot fill login form: {}", e)))?;

        match submit {
            Some(selector) => {
                let clicked = self
                    .driver
                    .click_element(selector, self.timeouts.element)
                    .await
                    .map_err(|e| SiteError::LoginFailed(e.to_string()))?;
                if !clicked {
                    return Err(SiteError::LoginFailed(format!(
                        "login button {} not found",
                        selector
                    )));
                }
            }
            None => self
                .driver
                .submit_form(self.timeouts.page)
                .await
                .map_err(|e| SiteError::LoginFailed(e.to_string()))?,
        }

        Ok(())
    }

    /// CSS selector for seats tagged `tag`.
    pub fn seat_selector(&self, tag: &str) -> String {
        format!(
            "[{}='{}']",
            self.selectors.seat_attribute,
            escape_attribute_value(tag)
        )
    }

    pub async fn open_event_page(&self, url: &str) -> Result<(), SiteError> {
        self.driver
            .navigate(url, self.timeouts.page)
            .await
            .map_err(|e| SiteError::Navigation(e.to_string()))?;
        info!("{}: event page loaded", self.site);
        Ok(())
    }

    pub async fn locate_availability(&self) -> bool {
        scan_indicators(
            self.driver.as_ref(),
            self.selectors.availability,
            self.timeouts.element,
        )
        .await
    }

    pub async fn select_seat(&self, tag: &str) -> Result<bool, SiteError> {
        let selector = self.seat_selector(tag);
        self.driver
            .click_element(&selector, self.timeouts.element)
            .await
            .map_err(|e| SiteError::Selection(format!("seat {}: {}", tag, e)))
    }

    pub async fn select_any_seat(&self) -> Result<bool, SiteError> {
        self.driver
            .click_element(self.selectors.any_seat, self.timeouts.element)
            .await
            .map_err(|e| SiteError::Selection(format!("any seat: {}", e)))
    }

    pub async fn confirm_purchase(&self) -> Result<(), SiteError> {
        for selector in self.selectors.confirm {
            match self
                .driver
                .click_element(selector, self.timeouts.element)
                .await
            {
                Ok(true) => {
                    info!("{}: purchase control {} clicked", self.site, selector);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => debug!("{}: purchase control {} failed: {}", self.site, selector, e),
            }
        }
        Err(SiteError::Confirmation("no purchase control found".to_string()))
    }

    pub async fn observe_payment_success(&self) -> bool {
        match self
            .driver
            .element_exists(self.selectors.payment_success, self.timeouts.element)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                debug!("{}: payment check failed: {}", self.site, e);
                false
            }
        }
    }

    pub async fn order_reference(&self) -> Option<String> {
        let selector = self.selectors.order_number?;
        match self.driver.get_text(selector, self.timeouts.element).await {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                debug!("{}: no order number on page: {}", self.site, e);
                None
            }
        }
    }

    /// Save a screenshot named after the site and `label`, if a directory is configured.
    pub async fn capture(&self, label: &str) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(format!(
            "{}-{}-{}.png",
            self.site,
            label,
            Utc::now().format("%Y%m%d-%H%M%S")
        ));
        match self.driver.screenshot(&path).await {
            Ok(()) => info!("Screenshot saved to {}", path.display()),
            Err(e) => warn!("Failed to save screenshot {}: {}", path.display(), e),
        }
    }
}

fn escape_attribute_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The site-specific part of a browser adapter: how to log in.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self, site: &BrowserSite, credentials: &Credentials) -> Result<(), SiteError>;
}

/// Browser adapter for one site, combining the shared purchase flow with the site's login.
pub struct BrowserAdapter<L> {
    inner: BrowserSite,
    login: L,
}

impl<L: LoginFlow> BrowserAdapter<L> {
    pub fn new(inner: BrowserSite, login: L) -> Self {
        Self { inner, login }
    }
}

#[async_trait]
impl<L: LoginFlow> SiteAdapter for BrowserAdapter<L> {
    fn site(&self) -> SiteId {
        self.inner.site()
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), SiteError> {
        self.login.login(&self.inner, credentials).await?;
        info!("{} login successful", self.inner.site());
        Ok(())
    }

    async fn open_event_page(&self, url: &str) -> Result<(), SiteError> {
        self.inner.open_event_page(url).await
    }

    async fn locate_availability(&self) -> bool {
        self.inner.locate_availability().await
    }

    async fn select_seat(&self, tag: &str) -> Result<bool, SiteError> {
        self.inner.select_seat(tag).await
    }

    async fn select_any_seat(&self) -> Result<bool, SiteError> {
        self.inner.select_any_seat().await
    }

    async fn confirm_purchase(&self) -> Result<(), SiteError> {
        self.inner.confirm_purchase().await
    }

    async fn observe_payment_success(&self) -> bool {
        self.inner.observe_payment_success().await
    }

    async fn order_reference(&self) -> Option<String> {
        self.inner.order_reference().await
    }

    async fn capture(&self, label: &str) {
        self.inner.capture(label).await
    }
}
