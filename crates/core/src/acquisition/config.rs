//! Acquisition timing and retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and retry parameters for an acquisition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Delay between availability polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after the event page loads, so client-side rendering can finish (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Extra navigation attempts after the first one fails.
    #[serde(default = "default_navigation_retries")]
    pub navigation_max_retries: u32,

    /// Linear backoff step between navigation attempts (milliseconds).
    /// Attempt `n` waits `n * navigation_backoff_ms`.
    #[serde(default = "default_navigation_backoff")]
    pub navigation_backoff_ms: u64,

    /// How long to wait for the payment-success signal (milliseconds).
    /// Payment is completed by a human; on expiry the run fails and is not retried.
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_ms: u64,

    /// How often to look for the payment-success signal (milliseconds).
    #[serde(default = "default_payment_check_interval")]
    pub payment_check_interval_ms: u64,

    /// Seat-selection / confirm failures tolerated before the run is declared exhausted.
    /// 0 = unlimited.
    #[serde(default = "default_max_soft_retries")]
    pub max_soft_retries: u32,

    /// Upper bound for any single site interaction (milliseconds).
    #[serde(default = "default_interaction_timeout")]
    pub interaction_timeout_ms: u64,

    /// Give up polling after this long (milliseconds). Unset = poll until cancelled.
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_settle_delay() -> u64 {
    2000
}

fn default_navigation_retries() -> u32 {
    3
}

fn default_navigation_backoff() -> u64 {
    1000
}

fn default_payment_timeout() -> u64 {
    60_000
}

fn default_payment_check_interval() -> u64 {
    1000
}

fn default_max_soft_retries() -> u32 {
    20
}

fn default_interaction_timeout() -> u64 {
    15_000
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            settle_delay_ms: default_settle_delay(),
            navigation_max_retries: default_navigation_retries(),
            navigation_backoff_ms: default_navigation_backoff(),
            payment_timeout_ms: default_payment_timeout(),
            payment_check_interval_ms: default_payment_check_interval(),
            max_soft_retries: default_max_soft_retries(),
            interaction_timeout_ms: default_interaction_timeout(),
            poll_timeout_ms: None,
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Backoff before navigation attempt `attempt + 1`, growing linearly.
    pub fn navigation_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.navigation_backoff_ms.saturating_mul(attempt as u64))
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_millis(self.payment_timeout_ms)
    }

    pub fn payment_check_interval(&self) -> Duration {
        Duration::from_millis(self.payment_check_interval_ms)
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.interaction_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }

    /// Whether `soft_failures` failures exceed the soft-retry budget.
    pub fn soft_retries_exhausted(&self, soft_failures: u32) -> bool {
        self.max_soft_retries != 0 && soft_failures > self.max_soft_retries
    }
}
