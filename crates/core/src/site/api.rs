//! Site adapter backed by a structured ticketing API.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::{ApiError, PurchaseRequest, TicketInfo, TicketingApi};
use crate::config::{Credentials, EventTarget, SiteId};

use super::{SiteAdapter, SiteError};

/// Drives one event through a `TicketingApi` instead of a browser.
///
/// Seat types map to ticket categories. Categories priced above the
/// target's `max_price` are never chosen.
pub struct ApiSiteAdapter {
    site: SiteId,
    api: Arc<dyn TicketingApi>,
    target: EventTarget,
    chosen: RwLock<Option<TicketInfo>>,
    order: RwLock<Option<String>>,
}

impl ApiSiteAdapter {
    pub fn new(site: SiteId, api: Arc<dyn TicketingApi>, target: EventTarget) -> Self {
        Self {
            site,
            api,
            target,
            chosen: RwLock::new(None),
            order: RwLock::new(None),
        }
    }

    async fn candidates(&self) -> Result<Vec<TicketInfo>, SiteError> {
        let tickets = self.api.get_ticket_info(&self.target.id).await?;
        Ok(tickets
            .into_iter()
            .filter(|t| t.is_purchasable() && self.target.accepts_price(t.price))
            .collect())
    }

    async fn choose(&self, ticket: TicketInfo) {
        info!(
            "{}: selected {} ({}, price {})",
            self.site, ticket.id, ticket.seat_type, ticket.price
        );
        *self.chosen.write().await = Some(ticket);
    }
}

#[async_trait]
impl SiteAdapter for ApiSiteAdapter {
    fn site(&self) -> SiteId {
        self.site
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), SiteError> {
        self.api.login(credentials).await.map_err(|e| match e {
            ApiError::AuthenticationFailed(msg) => SiteError::LoginFailed(msg),
            other => SiteError::LoginFailed(other.to_string()),
        })
    }

    async fn open_event_page(&self, _url: &str) -> Result<(), SiteError> {
        let tickets = self
            .api
            .get_ticket_info(&self.target.id)
            .await
            .map_err(|e| SiteError::Navigation(e.to_string()))?;
        debug!(
            "{}: event {} lists {} ticket categories",
            self.site,
            self.target.id,
            tickets.len()
        );
        Ok(())
    }

    async fn locate_availability(&self) -> bool {
        match self.api.check_availability(&self.target.id).await {
            Ok(available) => available,
            Err(e) => {
                debug!("{}: availability check failed: {}", self.site, e);
                false
            }
        }
    }

    async fn select_seat(&self, tag: &str) -> Result<bool, SiteError> {
        let found = self
            .candidates()
            .await?
            .into_iter()
            .find(|t| t.seat_type.eq_ignore_ascii_case(tag));
        match found {
            Some(ticket) => {
                self.choose(ticket).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn select_any_seat(&self) -> Result<bool, SiteError> {
        let cheapest = self.candidates().await?.into_iter().min_by_key(|t| t.price);
        match cheapest {
            Some(ticket) => {
                self.choose(ticket).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn confirm_purchase(&self) -> Result<(), SiteError> {
        let ticket = self
            .chosen
            .read()
            .await
            .clone()
            .ok_or_else(|| SiteError::Confirmation("no ticket selected".to_string()))?;

        let order_id = self
            .api
            .purchase(&PurchaseRequest::single(&ticket.id))
            .await
            .map_err(|e| SiteError::Confirmation(e.to_string()))?;

        *self.order.write().await = Some(order_id);
        Ok(())
    }

    async fn observe_payment_success(&self) -> bool {
        self.order.read().await.is_some()
    }

    async fn order_reference(&self) -> Option<String> {
        self.order.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockTicketingApi};

    fn adapter(api: &Arc<MockTicketingApi>, target: EventTarget) -> ApiSiteAdapter {
        ApiSiteAdapter::new(
            SiteId::Melon,
            Arc::clone(api) as Arc<dyn TicketingApi>,
            target,
        )
    }

    #[tokio::test]
    async fn test_select_matches_seat_type_case_insensitively() {
        let api = Arc::new(MockTicketingApi::new());
        api.set_tickets(vec![
            fixtures::ticket("t-a", "A", 90_000),
            fixtures::ticket("t-vip", "VIP", 150_000),
        ])
        .await;
        let adapter = adapter(&api, fixtures::event_target());

        assert!(adapter.select_seat("vip").await.unwrap());
        assert_eq!(adapter.chosen.read().await.as_ref().unwrap().id, "t-vip");
        assert!(!adapter.select_seat("R").await.unwrap());
    }

    #[tokio::test]
    async fn test_max_price_excludes_expensive_categories() {
        let api = Arc::new(MockTicketingApi::new());
        api.set_tickets(vec![fixtures::ticket("t-vip", "VIP", 150_000)])
            .await;
        let adapter = adapter(&api, fixtures::event_target().with_max_price(100_000));

        assert!(!adapter.select_seat("VIP").await.unwrap());
        assert!(!adapter.select_any_seat().await.unwrap());
    }

    #[tokio::test]
    async fn test_any_seat_picks_cheapest_purchasable() {
        let api = Arc::new(MockTicketingApi::new());
        let mut sold_out = fixtures::ticket("t-c", "C", 10_000);
        sold_out.quantity = 0;
        api.set_tickets(vec![
            fixtures::ticket("t-a", "A", 90_000),
            sold_out,
            fixtures::ticket("t-b", "B", 60_000),
        ])
        .await;
        let adapter = adapter(&api, fixtures::event_target());

        assert!(adapter.select_any_seat().await.unwrap());
        assert_eq!(adapter.chosen.read().await.as_ref().unwrap().id, "t-b");
    }

    #[tokio::test]
    async fn test_confirm_purchases_chosen_ticket() {
        let api = Arc::new(MockTicketingApi::new());
        api.set_tickets(vec![fixtures::ticket("t-vip", "VIP", 150_000)])
            .await;
        let adapter = adapter(&api, fixtures::event_target());

        assert!(!adapter.observe_payment_success().await);
        adapter.select_seat("VIP").await.unwrap();
        adapter.confirm_purchase().await.unwrap();

        let purchases = api.purchases().await;
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].ticket_id, "t-vip");
        assert!(adapter.observe_payment_success().await);
        assert!(adapter.order_reference().await.is_some());
    }

    #[tokio::test]
    async fn test_confirm_without_selection_fails() {
        let api = Arc::new(MockTicketingApi::new());
        let adapter = adapter(&api, fixtures::event_target());
        let err = adapter.confirm_purchase().await.unwrap_err();
        assert!(matches!(err, SiteError::Confirmation(_)));
        assert!(api.purchases().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_error_maps_to_login_failed() {
        let api = Arc::new(MockTicketingApi::new());
        api.set_next_error(ApiError::AuthenticationFailed("bad password".to_string()))
            .await;
        let adapter = adapter(&api, fixtures::event_target());

        let err = adapter.login(&fixtures::credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed: bad password");
    }

    #[tokio::test]
    async fn test_availability_errors_read_as_unavailable() {
        let api = Arc::new(MockTicketingApi::new());
        api.set_available(true).await;
        let adapter = adapter(&api, fixtures::event_target());
        assert!(adapter.locate_availability().await);

        api.set_next_error(ApiError::Timeout).await;
        assert!(!adapter.locate_availability().await);
    }
}
