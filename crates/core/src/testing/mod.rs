//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam (site adapter, page driver, ticketing API,
//! notifier) so acquisition runs can be exercised end to end without a
//! browser or network.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickgrab_core::testing::{fixtures, MockSiteAdapter};
//!
//! let site = Arc::new(MockSiteAdapter::new());
//! site.set_availability(vec![false, true]).await;
//! site.set_clickable_tags(&["VIP"]).await;
//!
//! let machine = AcquisitionMachine::new(site, fixtures::event_target(), fixtures::credentials(), config);
//! ```

mod mock_api;
mod mock_driver;
mod mock_site;

pub use mock_api::{MockNotifier, MockTicketingApi};
pub use mock_driver::MockPageDriver;
pub use mock_site::MockSiteAdapter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::acquisition::AcquisitionConfig;
    use crate::api::TicketInfo;
    use crate::config::{Credentials, EventTarget};

    pub fn credentials() -> Credentials {
        Credentials::new("fan@example.com", "hunter2")
    }

    /// Event target preferring VIP seats.
    pub fn event_target() -> EventTarget {
        let mut target = EventTarget::new("concert-1", "https://tickets.example/concert/1")
            .with_preferred_seats(["VIP"]);
        target.name = "Spring Tour 2025".to_string();
        target
    }

    /// Purchasable ticket category with one seat left.
    pub fn ticket(id: &str, seat_type: &str, price: u64) -> TicketInfo {
        TicketInfo {
            id: id.to_string(),
            name: format!("{} seat", seat_type),
            price,
            seat_type: seat_type.to_string(),
            available: true,
            quantity: 1,
            venue: None,
            date: None,
            time: None,
        }
    }

    /// Millisecond-scale timings for fast tests.
    pub fn fast_acquisition_config() -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval_ms: 10,
            settle_delay_ms: 0,
            navigation_max_retries: 2,
            navigation_backoff_ms: 1,
            payment_timeout_ms: 300,
            payment_check_interval_ms: 10,
            max_soft_retries: 5,
            interaction_timeout_ms: 1000,
            poll_timeout_ms: None,
        }
    }
}
