//! Ticketing site API abstraction.
//!
//! Some sites expose structured endpoints for ticket listings and purchases.
//! The `TicketingApi` trait covers them; `HttpTicketingApi` speaks JSON over HTTP.

mod http;
mod types;

pub use http::HttpTicketingApi;
pub use types::*;
