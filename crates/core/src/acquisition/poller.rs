//! Availability polling.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::PageDriver;
use crate::site::SiteAdapter;

use super::AcquisitionRun;

/// One way of recognizing purchasable seats on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityIndicator {
    /// Any element matches the CSS selector.
    Selector(&'static str),
    /// The script evaluates to a truthy value.
    Script(&'static str),
}

/// Check `indicators` in order and stop at the first match.
///
/// Indicator errors are treated as "not found" so one broken selector never
/// hides a later match.
pub async fn scan_indicators(
    driver: &dyn PageDriver,
    indicators: &[AvailabilityIndicator],
    timeout: Duration,
) -> bool {
    for indicator in indicators {
        let found = match indicator {
            AvailabilityIndicator::Selector(selector) => {
                driver.element_exists(selector, timeout).await
            }
            AvailabilityIndicator::Script(script) => driver
                .execute_script(script, timeout)
                .await
                .map(|value| is_truthy(&value)),
        };
        match found {
            Ok(true) => {
                debug!("Availability indicator matched: {:?}", indicator);
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("Availability indicator {:?} failed: {}", indicator, e),
        }
    }
    false
}

fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// How a wait for availability ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Available,
    Cancelled,
    TimedOut,
}

/// Repeatedly checks a site until seats show up.
#[derive(Debug, Clone)]
pub struct AvailabilityPoller {
    interval: Duration,
    check_timeout: Duration,
}

impl AvailabilityPoller {
    pub fn new(interval: Duration, check_timeout: Duration) -> Self {
        Self {
            interval,
            check_timeout,
        }
    }

    /// Single read-only check. A check that overruns its timeout reads as `false`.
    pub async fn poll(&self, adapter: &dyn SiteAdapter) -> bool {
        match tokio::time::timeout(self.check_timeout, adapter.locate_availability()).await {
            Ok(available) => available,
            Err(_) => {
                debug!("Availability check timed out after {:?}", self.check_timeout);
                false
            }
        }
    }

    /// Poll until seats are available, `cancel` fires, or `deadline` passes.
    ///
    /// The first check runs immediately. Every check increments
    /// `run.poll_cycles`.
    pub async fn wait_for_availability(
        &self,
        adapter: &dyn SiteAdapter,
        run: &mut AcquisitionRun,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> PollOutcome {
        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return PollOutcome::TimedOut;
            }

            run.poll_cycles += 1;
            let available = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                available = self.poll(adapter) => available,
            };
            if available {
                return PollOutcome::Available;
            }
            debug!("No seats yet (poll cycle {})", run.poll_cycles);

            let wait = match deadline {
                Some(d) => self.interval.min(d.saturating_duration_since(Instant::now())),
                None => self.interval,
            };
            if !sleep_or_cancel(cancel, wait).await {
                return PollOutcome::Cancelled;
            }
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first. Returns false if cancelled.
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
