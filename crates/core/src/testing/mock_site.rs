//! Mock site adapter for testing.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::{Credentials, SiteId};
use crate::site::{SiteAdapter, SiteError};

/// Mock implementation of the SiteAdapter trait.
///
/// Provides controllable behavior for testing:
/// - Scripted availability answers, one per check
/// - Clickable / failing seat tags and a generic seat
/// - Failing logins, navigations and confirmations
/// - Payment success after N checks
/// - A log of every call, in order
///
/// # Example
///
/// ```rust,ignore
/// use tickgrab_core::testing::MockSiteAdapter;
///
/// let site = MockSiteAdapter::new();
/// site.set_availability(vec![false, false, true]).await;
/// site.set_clickable_tags(&["VIP"]).await;
/// site.set_payment_success_after(2).await;
/// ```
#[derive(Debug)]
pub struct MockSiteAdapter {
    site: SiteId,
    /// Every call, in order ("login", "select_seat:VIP", ...).
    calls: Arc<RwLock<Vec<String>>>,
    login_error: Arc<RwLock<Option<String>>>,
    login_delay: Arc<RwLock<Duration>>,
    /// Number of upcoming navigations that fail.
    navigation_failures: Arc<RwLock<u32>>,
    /// Answers for upcoming availability checks.
    availability: Arc<RwLock<VecDeque<bool>>>,
    /// Answer once the scripted queue is empty.
    default_availability: Arc<RwLock<bool>>,
    check_delay: Arc<RwLock<Duration>>,
    clickable_tags: Arc<RwLock<HashSet<String>>>,
    failing_tags: Arc<RwLock<HashSet<String>>>,
    any_seat_available: Arc<RwLock<bool>>,
    /// Number of upcoming confirmations that fail.
    confirm_failures: Arc<RwLock<u32>>,
    /// Payment check (1-based) from which success is reported.
    payment_success_after: Arc<RwLock<Option<u32>>>,
    payment_checks: Arc<RwLock<u32>>,
    order_reference: Arc<RwLock<Option<String>>>,
    order_reference_delay: Arc<RwLock<Duration>>,
    captures: Arc<RwLock<Vec<String>>>,
}

impl Default for MockSiteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSiteAdapter {
    /// Create a mock that logs in, opens pages, and never sees availability.
    pub fn new() -> Self {
        Self {
            site: SiteId::Interpark,
            calls: Arc::new(RwLock::new(Vec::new())),
            login_error: Arc::new(RwLock::new(None)),
            login_delay: Arc::new(RwLock::new(Duration::ZERO)),
            navigation_failures: Arc::new(RwLock::new(0)),
            availability: Arc::new(RwLock::new(VecDeque::new())),
            default_availability: Arc::new(RwLock::new(false)),
            check_delay: Arc::new(RwLock::new(Duration::ZERO)),
            clickable_tags: Arc::new(RwLock::new(HashSet::new())),
            failing_tags: Arc::new(RwLock::new(HashSet::new())),
            any_seat_available: Arc::new(RwLock::new(false)),
            confirm_failures: Arc::new(RwLock::new(0)),
            payment_success_after: Arc::new(RwLock::new(None)),
            payment_checks: Arc::new(RwLock::new(0)),
            order_reference: Arc::new(RwLock::new(None)),
            order_reference_delay: Arc::new(RwLock::new(Duration::ZERO)),
            captures: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Report a different site id.
    pub fn with_site(mut self, site: SiteId) -> Self {
        self.site = site;
        self
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Make login fail with an authentication error.
    pub async fn set_login_error(&self, message: &str) {
        *self.login_error.write().await = Some(message.to_string());
    }

    /// Make login take this long.
    pub async fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.write().await = delay;
    }

    /// Fail the next `count` navigations.
    pub async fn fail_navigations(&self, count: u32) {
        *self.navigation_failures.write().await = count;
    }

    /// Script the answers for the next availability checks.
    pub async fn set_availability(&self, answers: Vec<bool>) {
        *self.availability.write().await = answers.into();
    }

    /// Answer used once the scripted checks are used up.
    pub async fn set_default_availability(&self, available: bool) {
        *self.default_availability.write().await = available;
    }

    /// Make every availability check take this long.
    pub async fn set_delay(&self, delay: Duration) {
        *self.check_delay.write().await = delay;
    }

    pub async fn set_clickable_tags(&self, tags: &[&str]) {
        let mut clickable = self.clickable_tags.write().await;
        clickable.extend(tags.iter().map(|t| t.to_string()));
    }

    /// Seat tags whose selection errors instead of answering.
    pub async fn set_failing_tags(&self, tags: &[&str]) {
        let mut failing = self.failing_tags.write().await;
        failing.extend(tags.iter().map(|t| t.to_string()));
    }

    pub async fn set_any_seat_available(&self, available: bool) {
        *self.any_seat_available.write().await = available;
    }

    /// Fail the next `count` purchase confirmations.
    pub async fn fail_confirms(&self, count: u32) {
        *self.confirm_failures.write().await = count;
    }

    /// Report payment success from the `check`-th payment check on.
    pub async fn set_payment_success_after(&self, check: u32) {
        *self.payment_success_after.write().await = Some(check);
    }

    pub async fn set_order_reference(&self, reference: &str) {
        *self.order_reference.write().await = Some(reference.to_string());
    }

    /// Delay every order number lookup.
    pub async fn set_order_reference_delay(&self, delay: Duration) {
        *self.order_reference_delay.write().await = delay;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every call made, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    async fn count_calls(&self, name: &str) -> usize {
        self.calls.read().await.iter().filter(|c| *c == name).count()
    }

    pub async fn login_calls(&self) -> usize {
        self.count_calls("login").await
    }

    pub async fn navigation_attempts(&self) -> usize {
        self.count_calls("open_event_page").await
    }

    pub async fn poll_calls(&self) -> usize {
        self.count_calls("locate_availability").await
    }

    pub async fn confirm_calls(&self) -> usize {
        self.count_calls("confirm_purchase").await
    }

    pub async fn payment_checks(&self) -> u32 {
        *self.payment_checks.read().await
    }

    /// Tags passed to `select_seat`, in order.
    pub async fn seat_attempts(&self) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| c.strip_prefix("select_seat:").map(String::from))
            .collect()
    }

    pub async fn any_seat_attempts(&self) -> usize {
        self.count_calls("select_any_seat").await
    }

    /// Labels passed to `capture`.
    pub async fn captures(&self) -> Vec<String> {
        self.captures.read().await.clone()
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.write().await.push(call.into());
    }
}

#[async_trait]
impl SiteAdapter for MockSiteAdapter {
    fn site(&self) -> SiteId {
        self.site
    }

    async fn login(&self, _credentials: &Credentials) -> Result<(), SiteError> {
        self.record("login").await;
        let delay = *self.login_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.login_error.read().await.clone() {
            Some(message) => Err(SiteError::LoginFailed(message)),
            None => Ok(()),
        }
    }

    async fn open_event_page(&self, url: &str) -> Result<(), SiteError> {
        self.record("open_event_page").await;
        let mut failures = self.navigation_failures.write().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(SiteError::Navigation(format!("mock: {} unreachable", url)));
        }
        Ok(())
    }

    async fn locate_availability(&self) -> bool {
        self.record("locate_availability").await;
        let delay = *self.check_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.availability.write().await.pop_front() {
            Some(answer) => answer,
            None => *self.default_availability.read().await,
        }
    }

    async fn select_seat(&self, tag: &str) -> Result<bool, SiteError> {
        self.record(format!("select_seat:{}", tag)).await;
        if self.failing_tags.read().await.contains(tag) {
            return Err(SiteError::Selection(format!("mock: {} errored", tag)));
        }
        Ok(self.clickable_tags.read().await.contains(tag))
    }

    async fn select_any_seat(&self) -> Result<bool, SiteError> {
        self.record("select_any_seat").await;
        Ok(*self.any_seat_available.read().await)
    }

    async fn confirm_purchase(&self) -> Result<(), SiteError> {
        self.record("confirm_purchase").await;
        let mut failures = self.confirm_failures.write().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(SiteError::Confirmation("mock: seat taken".to_string()));
        }
        Ok(())
    }

    async fn observe_payment_success(&self) -> bool {
        self.record("observe_payment_success").await;
        let mut checks = self.payment_checks.write().await;
        *checks += 1;
        match *self.payment_success_after.read().await {
            Some(after) => *checks >= after,
            None => false,
        }
    }

    async fn order_reference(&self) -> Option<String> {
        let delay = *self.order_reference_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.order_reference.read().await.clone()
    }

    async fn capture(&self, label: &str) {
        self.captures.write().await.push(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_availability_queue_then_default() {
        let site = MockSiteAdapter::new();
        site.set_availability(vec![false, true]).await;

        assert!(!site.locate_availability().await);
        assert!(site.locate_availability().await);
        assert!(!site.locate_availability().await);
        assert_eq!(site.poll_calls().await, 3);
    }

    #[tokio::test]
    async fn test_confirm_failures_are_consumed() {
        let site = MockSiteAdapter::new();
        site.fail_confirms(1).await;

        assert!(site.confirm_purchase().await.is_err());
        assert!(site.confirm_purchase().await.is_ok());
        assert_eq!(site.confirm_calls().await, 2);
    }

    #[tokio::test]
    async fn test_payment_success_after_checks() {
        let site = MockSiteAdapter::new();
        site.set_payment_success_after(2).await;

        assert!(!site.observe_payment_success().await);
        assert!(site.observe_payment_success().await);
        assert_eq!(site.payment_checks().await, 2);
    }

    #[tokio::test]
    async fn test_call_log_order() {
        let site = MockSiteAdapter::new();
        site.login(&Credentials::new("u", "p")).await.unwrap();
        site.select_seat("VIP").await.unwrap();
        site.select_any_seat().await.unwrap();

        assert_eq!(
            site.calls().await,
            vec!["login", "select_seat:VIP", "select_any_seat"]
        );
    }
}
