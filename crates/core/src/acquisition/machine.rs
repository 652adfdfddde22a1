//! The acquisition state machine.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Credentials, EventTarget};
use crate::events::{AcquisitionEvent, EventHandle};
use crate::site::{SiteAdapter, SiteError};

use super::poller::sleep_or_cancel;
use super::{
    select_seat, AcquisitionConfig, AcquisitionError, AcquisitionPhase, AcquisitionRun,
    AvailabilityPoller, FailureReason, PollOutcome, RunOutcome,
};

/// Drives one event target from login to payment against a site adapter.
///
/// The machine is site-agnostic. A run is strictly sequential: one adapter
/// call in flight at a time. Cancellation is cooperative and checked before
/// every action that changes remote state; an action already in flight is
/// allowed to finish.
pub struct AcquisitionMachine {
    adapter: Arc<dyn SiteAdapter>,
    target: EventTarget,
    credentials: Credentials,
    config: AcquisitionConfig,
    events: Option<EventHandle>,
}

impl AcquisitionMachine {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        target: EventTarget,
        credentials: Credentials,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            adapter,
            target,
            credentials,
            config,
            events: None,
        }
    }

    /// Publish run events to `events`.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn target(&self) -> &EventTarget {
        &self.target
    }

    /// Execute one run to a terminal phase.
    pub async fn run(&self, cancel: CancellationToken) -> AcquisitionRun {
        let mut run = AcquisitionRun::new(&self.target.id);
        info!(
            "Starting run {} for {} on {}",
            run.id,
            self.target.label(),
            self.adapter.site()
        );
        self.emit(
            &run,
            AcquisitionEvent::RunStarted {
                event_id: self.target.id.clone(),
                event_name: self.target.label().to_string(),
                site: self.adapter.site(),
            },
        )
        .await;

        let outcome = match self.drive(&mut run, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Run {} aborted: {}", run.id, e);
                RunOutcome::failed(FailureReason::Internal, e)
            }
        };
        self.finish(&mut run, outcome).await;
        run
    }

    async fn drive(
        &self,
        run: &mut AcquisitionRun,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AcquisitionError> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        if let Err(e) = self.call(self.adapter.login(&self.credentials)).await {
            warn!("Login failed: {}", e);
            return Ok(RunOutcome::failed(FailureReason::LoginFailed, e));
        }
        self.advance(run, AcquisitionPhase::LoggedIn).await?;

        if let Some(outcome) = self.open_event_page(run, cancel).await {
            return Ok(outcome);
        }
        self.advance(run, AcquisitionPhase::OnEventPage).await?;

        if !sleep_or_cancel(cancel, self.config.settle_delay()).await {
            return Ok(RunOutcome::Cancelled);
        }

        if let Some(outcome) = self.purchase_loop(run, cancel).await? {
            return Ok(outcome);
        }

        self.advance(run, AcquisitionPhase::AwaitingPayment).await?;
        Ok(self.await_payment(run, cancel).await)
    }

    /// Open the event page, retrying with linear backoff.
    ///
    /// Returns a terminal outcome if the page never loads or the run is cancelled.
    async fn open_event_page(
        &self,
        run: &mut AcquisitionRun,
        cancel: &CancellationToken,
    ) -> Option<RunOutcome> {
        let attempts = self.config.navigation_max_retries + 1;
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Some(RunOutcome::Cancelled);
            }
            match self.call(self.adapter.open_event_page(&self.target.url)).await {
                Ok(()) => return None,
                Err(e) => {
                    warn!(
                        "Opening {} failed (attempt {}/{}): {}",
                        self.target.url, attempt, attempts, e
                    );
                    run.last_error = Some(e.to_string());
                    if attempt == attempts {
                        return Some(RunOutcome::failed(FailureReason::NavigationFailed, e));
                    }
                    if !sleep_or_cancel(cancel, self.config.navigation_backoff(attempt)).await {
                        return Some(RunOutcome::Cancelled);
                    }
                }
            }
        }
        None
    }

    /// Poll, select and confirm until a purchase is confirmed.
    ///
    /// Returns `None` once the phase is `PurchaseConfirmed`, or the terminal
    /// outcome that ended the loop.
    async fn purchase_loop(
        &self,
        run: &mut AcquisitionRun,
        cancel: &CancellationToken,
    ) -> Result<Option<RunOutcome>, AcquisitionError> {
        let poller =
            AvailabilityPoller::new(self.config.poll_interval(), self.config.interaction_timeout());
        let deadline = self.config.poll_timeout().map(|t| Instant::now() + t);

        loop {
            if run.phase != AcquisitionPhase::Polling {
                self.advance(run, AcquisitionPhase::Polling).await?;
            }

            match poller
                .wait_for_availability(self.adapter.as_ref(), run, cancel, deadline)
                .await
            {
                PollOutcome::Available => {}
                PollOutcome::Cancelled => return Ok(Some(RunOutcome::Cancelled)),
                PollOutcome::TimedOut => {
                    return Ok(Some(RunOutcome::failed(
                        FailureReason::PollTimeout,
                        format!("no availability after {} poll cycles", run.poll_cycles),
                    )))
                }
            }

            info!("Tickets available for {} (poll cycle {})", self.target.label(), run.poll_cycles);
            self.emit(
                run,
                AcquisitionEvent::TicketFound {
                    event_id: self.target.id.clone(),
                    poll_cycle: run.poll_cycles,
                },
            )
            .await;

            let selection = match select_seat(
                self.adapter.as_ref(),
                &self.target.preferred_seats,
                self.config.interaction_timeout(),
                cancel,
            )
            .await
            {
                Ok(selection) => selection,
                Err(AcquisitionError::Cancelled) => return Ok(Some(RunOutcome::Cancelled)),
                Err(e) => {
                    if let Some(outcome) = self.soft_failure(run, e.to_string(), cancel).await {
                        return Ok(Some(outcome));
                    }
                    continue;
                }
            };

            run.selection = Some(selection.clone());
            self.advance(run, AcquisitionPhase::SeatSelected).await?;
            self.emit(
                run,
                AcquisitionEvent::SeatSelected {
                    tag: selection.tag.clone(),
                    was_preferred: selection.was_preferred,
                },
            )
            .await;

            if cancel.is_cancelled() {
                return Ok(Some(RunOutcome::Cancelled));
            }
            match self.call(self.adapter.confirm_purchase()).await {
                Ok(()) => {
                    info!("Purchase confirmed for seat {}", selection.tag);
                    self.advance(run, AcquisitionPhase::PurchaseConfirmed).await?;
                    return Ok(None);
                }
                Err(e) => {
                    self.advance(run, AcquisitionPhase::Polling).await?;
                    if let Some(outcome) = self.soft_failure(run, e.to_string(), cancel).await {
                        return Ok(Some(outcome));
                    }
                }
            }
        }
    }

    /// Wait for the human to finish paying.
    async fn await_payment(&self, run: &AcquisitionRun, cancel: &CancellationToken) -> RunOutcome {
        let timeout = self.config.payment_timeout();
        let interval = self.config.payment_check_interval();
        let started = Instant::now();
        info!(
            "Waiting up to {:?} for payment to be completed in the browser",
            timeout
        );

        let mut checks = 0u32;
        loop {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!("No payment confirmation after {} checks", checks);
                return RunOutcome::failed(
                    FailureReason::PaymentTimeout,
                    format!("no payment confirmation within {:?}", timeout),
                );
            }
            if !sleep_or_cancel(cancel, interval.min(timeout - elapsed)).await {
                return RunOutcome::Cancelled;
            }

            checks += 1;
            let paid = tokio::time::timeout(
                self.config.interaction_timeout(),
                self.adapter.observe_payment_success(),
            )
            .await
            .unwrap_or(false);
            if paid {
                let reference = tokio::time::timeout(
                    self.config.interaction_timeout(),
                    self.adapter.order_reference(),
                )
                .await
                .ok()
                .flatten();
                let order_ref = match reference {
                    Some(reference) => reference,
                    None => format!("local-{}", run.id),
                };
                info!("Payment completed, order {}", order_ref);
                return RunOutcome::Success { order_ref };
            }
            debug!("Payment not completed yet (check {})", checks);
        }
    }

    /// Record a transient failure and wait one poll interval before polling again.
    ///
    /// Returns the terminal outcome once the soft retry budget is spent or the
    /// run is cancelled during the pause.
    async fn soft_failure(
        &self,
        run: &mut AcquisitionRun,
        error: String,
        cancel: &CancellationToken,
    ) -> Option<RunOutcome> {
        let count = run.record_soft_failure(error.clone());
        warn!("Transient failure #{}, back to polling: {}", count, error);
        self.emit(
            run,
            AcquisitionEvent::SoftFailure {
                error: error.clone(),
                soft_failures: count,
            },
        )
        .await;

        if self.config.soft_retries_exhausted(count) {
            return Some(RunOutcome::failed(
                FailureReason::Exhausted,
                format!("{} transient failures, last: {}", count, error),
            ));
        }
        if !sleep_or_cancel(cancel, self.config.poll_interval()).await {
            return Some(RunOutcome::Cancelled);
        }
        None
    }

    async fn finish(&self, run: &mut AcquisitionRun, outcome: RunOutcome) {
        let from = run.phase;
        if let Err(e) = run.finish(outcome.clone()) {
            error!("Run {} could not be finished: {}", run.id, e);
            return;
        }
        self.emit(
            run,
            AcquisitionEvent::PhaseChanged {
                from,
                to: run.phase,
            },
        )
        .await;

        match &outcome {
            RunOutcome::Success { order_ref } => {
                info!("Run {} succeeded, order {}", run.id, order_ref);
                self.emit(
                    run,
                    AcquisitionEvent::PurchaseSucceeded {
                        event_id: self.target.id.clone(),
                        order_ref: order_ref.clone(),
                        seat_tag: run.selection.as_ref().map(|s| s.tag.clone()),
                    },
                )
                .await;
            }
            RunOutcome::Failed { reason, detail } => {
                error!("Run {} failed ({}): {}", run.id, reason, detail);
                self.adapter.capture(reason.as_str()).await;
                self.emit(
                    run,
                    AcquisitionEvent::PurchaseFailed {
                        event_id: self.target.id.clone(),
                        reason: *reason,
                        detail: detail.clone(),
                    },
                )
                .await;
            }
            RunOutcome::Cancelled => {
                info!("Run {} cancelled in phase {}", run.id, from);
                self.emit(
                    run,
                    AcquisitionEvent::RunCancelled {
                        event_id: self.target.id.clone(),
                        phase: from,
                    },
                )
                .await;
            }
        }
    }

    async fn advance(
        &self,
        run: &mut AcquisitionRun,
        next: AcquisitionPhase,
    ) -> Result<(), AcquisitionError> {
        let from = run.transition(next)?;
        debug!("Run {}: {} -> {}", run.id, from, next);
        self.emit(run, AcquisitionEvent::PhaseChanged { from, to: next })
            .await;
        Ok(())
    }

    /// Bound a site call by the interaction timeout.
    async fn call<T, F>(&self, action: F) -> Result<T, SiteError>
    where
        F: Future<Output = Result<T, SiteError>>,
    {
        let limit = self.config.interaction_timeout();
        match tokio::time::timeout(limit, action).await {
            Ok(result) => result,
            Err(_) => Err(SiteError::Timeout(limit)),
        }
    }

    async fn emit(&self, run: &AcquisitionRun, event: AcquisitionEvent) {
        if let Some(events) = &self.events {
            events.emit(&run.id, run.phase, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::site::SiteAdapter;
    use crate::testing::{fixtures, MockSiteAdapter};

    fn fast_config() -> AcquisitionConfig {
        AcquisitionConfig {
            poll_interval_ms: 5,
            settle_delay_ms: 0,
            navigation_max_retries: 2,
            navigation_backoff_ms: 1,
            payment_timeout_ms: 200,
            payment_check_interval_ms: 5,
            max_soft_retries: 3,
            interaction_timeout_ms: 500,
            poll_timeout_ms: None,
        }
    }

    fn machine(adapter: &Arc<MockSiteAdapter>, config: AcquisitionConfig) -> AcquisitionMachine {
        AcquisitionMachine::new(
            Arc::clone(adapter) as Arc<dyn SiteAdapter>,
            fixtures::event_target(),
            fixtures::credentials(),
            config,
        )
    }

    #[tokio::test]
    async fn test_navigation_retried_then_succeeds() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.fail_navigations(2).await;
        adapter.set_availability(vec![true]).await;
        adapter.set_clickable_tags(&["VIP"]).await;
        adapter.set_payment_success_after(1).await;

        let run = machine(&adapter, fast_config())
            .run(CancellationToken::new())
            .await;

        assert!(run.outcome.unwrap().is_success());
        assert_eq!(adapter.navigation_attempts().await, 3);
    }

    #[tokio::test]
    async fn test_navigation_exhausted() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.fail_navigations(10).await;

        let run = machine(&adapter, fast_config())
            .run(CancellationToken::new())
            .await;

        assert_eq!(
            run.outcome.as_ref().unwrap().failure_reason(),
            Some(FailureReason::NavigationFailed)
        );
        assert_eq!(adapter.navigation_attempts().await, 3);
        assert!(!run.visited(AcquisitionPhase::OnEventPage));
    }

    #[tokio::test]
    async fn test_soft_failures_are_capped() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.set_default_availability(true).await;

        let run = machine(&adapter, fast_config())
            .run(CancellationToken::new())
            .await;

        assert_eq!(
            run.outcome.unwrap().failure_reason(),
            Some(FailureReason::Exhausted)
        );
        assert_eq!(run.soft_failures, 4);
        assert_eq!(adapter.confirm_calls().await, 0);
    }

    #[tokio::test]
    async fn test_poll_timeout() {
        let adapter = Arc::new(MockSiteAdapter::new());
        let config = AcquisitionConfig {
            poll_timeout_ms: Some(30),
            ..fast_config()
        };

        let run = machine(&adapter, config).run(CancellationToken::new()).await;

        assert_eq!(
            run.outcome.unwrap().failure_reason(),
            Some(FailureReason::PollTimeout)
        );
    }

    #[tokio::test]
    async fn test_login_timeout_is_login_failure() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.set_login_delay(Duration::from_millis(200)).await;
        let config = AcquisitionConfig {
            interaction_timeout_ms: 20,
            ..fast_config()
        };

        let run = machine(&adapter, config).run(CancellationToken::new()).await;

        assert_eq!(
            run.outcome.unwrap().failure_reason(),
            Some(FailureReason::LoginFailed)
        );
    }

    #[tokio::test]
    async fn test_local_order_ref_when_site_reports_none() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.set_availability(vec![true]).await;
        adapter.set_any_seat_available(true).await;
        adapter.set_payment_success_after(1).await;

        let run = machine(&adapter, fast_config())
            .run(CancellationToken::new())
            .await;

        match run.outcome.clone().unwrap() {
            RunOutcome::Success { order_ref } => {
                assert_eq!(order_ref, format!("local-{}", run.id))
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert!(!run.selection.unwrap().was_preferred);
    }

    #[tokio::test]
    async fn test_slow_order_lookup_falls_back_to_local_ref() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.set_availability(vec![true]).await;
        adapter.set_clickable_tags(&["VIP"]).await;
        adapter.set_payment_success_after(1).await;
        adapter.set_order_reference("T-1").await;
        adapter
            .set_order_reference_delay(Duration::from_secs(5))
            .await;
        let config = AcquisitionConfig {
            interaction_timeout_ms: 50,
            ..fast_config()
        };

        let started = Instant::now();
        let run = machine(&adapter, config)
            .run(CancellationToken::new())
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            run.outcome,
            Some(RunOutcome::Success {
                order_ref: format!("local-{}", run.id)
            })
        );
    }

    #[tokio::test]
    async fn test_failed_run_captures_diagnostics() {
        let adapter = Arc::new(MockSiteAdapter::new());
        adapter.set_availability(vec![true]).await;
        adapter.set_clickable_tags(&["VIP"]).await;

        let run = machine(&adapter, fast_config())
            .run(CancellationToken::new())
            .await;

        assert_eq!(
            run.outcome.unwrap().failure_reason(),
            Some(FailureReason::PaymentTimeout)
        );
        assert_eq!(adapter.captures().await, vec!["payment_timeout"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_logs_in() {
        let adapter = Arc::new(MockSiteAdapter::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = machine(&adapter, fast_config()).run(cancel).await;

        assert_eq!(run.phase, AcquisitionPhase::Cancelled);
        assert_eq!(adapter.login_calls().await, 0);
    }
}
