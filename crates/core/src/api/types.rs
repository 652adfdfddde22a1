//! Types for structured ticketing site APIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Credentials;

/// Errors that can occur during ticketing API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Purchase rejected: {0}")]
    PurchaseRejected(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// A purchasable ticket category for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: u64,
    pub seat_type: String,
    pub available: bool,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl TicketInfo {
    /// Whether at least one seat of this category can be bought.
    pub fn is_purchasable(&self) -> bool {
        self.available && self.quantity > 0
    }
}

/// Purchase request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseRequest {
    pub ticket_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seats: Vec<String>,
}

impl PurchaseRequest {
    /// Request a single seat of the given ticket category.
    pub fn single(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            quantity: 1,
            seats: Vec::new(),
        }
    }
}

/// Purchase response body.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Availability response body.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

/// Trait for ticketing site API backends.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Authenticate; subsequent calls reuse the session.
    async fn login(&self, credentials: &Credentials) -> Result<(), ApiError>;

    /// Ticket categories for an event.
    async fn get_ticket_info(&self, event_id: &str) -> Result<Vec<TicketInfo>, ApiError>;

    /// Buy tickets; returns the order id on success.
    async fn purchase(&self, request: &PurchaseRequest) -> Result<String, ApiError>;

    /// Cheap availability check for an event.
    async fn check_availability(&self, event_id: &str) -> Result<bool, ApiError>;
}
