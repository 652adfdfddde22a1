//! Page driver abstraction.
//!
//! This module provides a `PageDriver` trait for interacting with a live page
//! session, and a W3C WebDriver implementation of it.

mod types;
mod webdriver;

pub use types::*;
pub use webdriver::WebDriverClient;
