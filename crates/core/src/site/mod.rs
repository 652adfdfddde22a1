//! Per-site strategies behind one adapter interface.
//!
//! The acquisition machine only ever sees `dyn SiteAdapter`; which site and
//! which transport (browser or structured API) is decided once, at startup.

mod api;
mod browser;
mod sites;

pub use api::ApiSiteAdapter;
pub use browser::{BrowserAdapter, BrowserSite, LoginFlow, SiteSelectors, DEFAULT_SELECTORS};
pub use sites::{
    create_browser_adapter, InterparkLogin, InterparkSite, MelonLogin, MelonSite, Yes24Login,
    Yes24Site,
};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::ApiError;
use crate::config::{Credentials, SiteId};
use crate::driver::DriverError;

/// Errors that can occur while acting on a ticketing site.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Seat selection failed: {0}")]
    Selection(String),

    #[error("Purchase confirmation failed: {0}")]
    Confirmation(String),

    #[error("Site interaction timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Site-specific login, navigation, selection, confirmation and payment probing.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Which site this adapter drives.
    fn site(&self) -> SiteId;

    /// Authenticate. Called once per run, before anything else.
    async fn login(&self, credentials: &Credentials) -> Result<(), SiteError>;

    /// Open the event's purchase page.
    async fn open_event_page(&self, url: &str) -> Result<(), SiteError>;

    /// Read-only check: is anything purchasable right now?
    ///
    /// Check errors count as "not available".
    async fn locate_availability(&self) -> bool;

    /// Try to pick a seat of type `tag`. `Ok(false)` if none is clickable.
    async fn select_seat(&self, tag: &str) -> Result<bool, SiteError>;

    /// Try to pick any available seat.
    async fn select_any_seat(&self) -> Result<bool, SiteError>;

    /// Commit the purchase of the selected seat.
    async fn confirm_purchase(&self) -> Result<(), SiteError>;

    /// Whether the payment-success signal is visible.
    async fn observe_payment_success(&self) -> bool;

    /// Order reference reported by the site, once payment went through.
    async fn order_reference(&self) -> Option<String> {
        None
    }

    /// Keep diagnostic material (e.g. a screenshot) for a failed run.
    async fn capture(&self, _label: &str) {}
}
