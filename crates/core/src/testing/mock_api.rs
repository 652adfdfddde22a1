//! Mock ticketing API and notifier for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::api::{ApiError, PurchaseRequest, TicketInfo, TicketingApi};
use crate::config::Credentials;
use crate::notify::{Notifier, NotifyError};

/// Mock implementation of the TicketingApi trait.
///
/// Serves a fixed ticket list, answers availability from a flag and hands out
/// sequential order ids. `set_next_error` fails exactly one upcoming call.
#[derive(Debug, Default)]
pub struct MockTicketingApi {
    tickets: Arc<RwLock<Vec<TicketInfo>>>,
    available: Arc<RwLock<bool>>,
    next_error: Arc<RwLock<Option<ApiError>>>,
    logins: Arc<RwLock<Vec<String>>>,
    purchases: Arc<RwLock<Vec<PurchaseRequest>>>,
}

impl MockTicketingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_tickets(&self, tickets: Vec<TicketInfo>) {
        *self.tickets.write().await = tickets;
    }

    pub async fn set_available(&self, available: bool) {
        *self.available.write().await = available;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ApiError) {
        *self.next_error.write().await = Some(error);
    }

    /// Usernames that logged in.
    pub async fn logins(&self) -> Vec<String> {
        self.logins.read().await.clone()
    }

    pub async fn purchases(&self) -> Vec<PurchaseRequest> {
        self.purchases.read().await.clone()
    }

    async fn take_error(&self) -> Result<(), ApiError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TicketingApi for MockTicketingApi {
    fn name(&self) -> &str {
        "mock"
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        self.take_error().await?;
        self.logins.write().await.push(credentials.username.clone());
        Ok(())
    }

    async fn get_ticket_info(&self, _event_id: &str) -> Result<Vec<TicketInfo>, ApiError> {
        self.take_error().await?;
        Ok(self.tickets.read().await.clone())
    }

    async fn purchase(&self, request: &PurchaseRequest) -> Result<String, ApiError> {
        self.take_error().await?;
        let mut purchases = self.purchases.write().await;
        purchases.push(request.clone());
        Ok(format!("order-{}", purchases.len()))
    }

    async fn check_availability(&self, _event_id: &str) -> Result<bool, ApiError> {
        self.take_error().await?;
        Ok(*self.available.read().await)
    }
}

/// Notifier that records what it was asked to send.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<(String, String)>>>,
    failing: Arc<RwLock<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every delivery (still recorded).
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    /// (title, message) pairs, in order.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .write()
            .await
            .push((title.to_string(), message.to_string()));
        if *self.failing.read().await {
            return Err(NotifyError::Rejected("mock failure".to_string()));
        }
        Ok(())
    }
}
