//! JSON-over-HTTP ticketing API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{Credentials, SiteConfig, SiteId};

use super::{
    ApiError, AvailabilityResponse, LoginRequest, LoginResponse, PurchaseRequest,
    PurchaseResponse, TicketInfo, TicketingApi,
};

/// HTTP client for sites exposing structured endpoints.
///
/// Endpoints, relative to the configured `api_url`:
/// - `POST /login`
/// - `GET /events/{id}/tickets`
/// - `GET /events/{id}/availability`
/// - `POST /purchase`
pub struct HttpTicketingApi {
    client: Client,
    site: SiteId,
    base_url: String,
    /// Bearer token from the last successful login.
    token: RwLock<Option<String>>,
}

impl HttpTicketingApi {
    /// Create a client for `site` from its configuration.
    pub fn new(site: SiteId, config: &SiteConfig) -> Result<Self, ApiError> {
        let base_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| ApiError::ApiError(format!("no api_url configured for {}", site)))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            site,
            base_url,
            token: RwLock::new(None),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        match self.token.read().await.as_deref() {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(ApiError::NotAuthenticated),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            *self.token.write().await = None;
            return Err(ApiError::NotAuthenticated);
        }
        if status.as_u16() == 404 {
            return Err(ApiError::EventNotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::ApiError(format!("invalid response body: {}", e)))
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else if e.is_connect() {
        ApiError::ConnectionFailed(e.to_string())
    } else {
        ApiError::ApiError(e.to_string())
    }
}

#[async_trait]
impl TicketingApi for HttpTicketingApi {
    fn name(&self) -> &str {
        self.site.as_str()
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let body = LoginRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        let resp: LoginResponse = self
            .fetch(self.client.post(self.url("/login")).json(&body))
            .await
            .map_err(|e| match e {
                ApiError::NotAuthenticated => {
                    ApiError::AuthenticationFailed("credentials rejected".to_string())
                }
                other => other,
            })?;

        if !resp.success {
            return Err(ApiError::AuthenticationFailed(resp.message));
        }

        // Cookie-based sites return no token; the cookie jar carries the session.
        *self.token.write().await = Some(resp.token.unwrap_or_default());
        info!("{} API login successful", self.site);
        Ok(())
    }

    async fn get_ticket_info(&self, event_id: &str) -> Result<Vec<TicketInfo>, ApiError> {
        let request = self
            .authorized(
                self.client
                    .get(self.url(&format!("/events/{}/tickets", event_id))),
            )
            .await?;
        let tickets: Vec<TicketInfo> = self.fetch(request).await?;
        debug!("{} tickets listed for event {}", tickets.len(), event_id);
        Ok(tickets)
    }

    async fn purchase(&self, request: &PurchaseRequest) -> Result<String, ApiError> {
        let http_request = self
            .authorized(self.client.post(self.url("/purchase")).json(request))
            .await?;
        let resp: PurchaseResponse = self.fetch(http_request).await?;

        match (resp.success, resp.order_id) {
            (true, Some(order_id)) => {
                info!("Purchase accepted, order {}", order_id);
                Ok(order_id)
            }
            (true, None) => Err(ApiError::ApiError(
                "purchase succeeded without an order id".to_string(),
            )),
            (false, _) => Err(ApiError::PurchaseRejected(resp.message)),
        }
    }

    async fn check_availability(&self, event_id: &str) -> Result<bool, ApiError> {
        let request = self
            .authorized(
                self.client
                    .get(self.url(&format!("/events/{}/availability", event_id))),
            )
            .await?;
        let resp: AvailabilityResponse = self.fetch(request).await?;
        Ok(resp.available)
    }
}
