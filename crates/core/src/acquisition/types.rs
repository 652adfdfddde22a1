//! Acquisition run types and the phase graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionPhase {
    Idle,
    LoggedIn,
    OnEventPage,
    Polling,
    SeatSelected,
    PurchaseConfirmed,
    AwaitingPayment,
    Success,
    Failed,
    Cancelled,
}

impl AcquisitionPhase {
    /// Success, Failed and Cancelled are terminal. Nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionPhase::Success | AcquisitionPhase::Failed | AcquisitionPhase::Cancelled
        )
    }

    /// Whether the phase graph has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: AcquisitionPhase) -> bool {
        use AcquisitionPhase::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Cancelled) | (_, Failed) => true,
            (Idle, LoggedIn) => true,
            (LoggedIn, OnEventPage) => true,
            (OnEventPage, Polling) => true,
            (Polling, SeatSelected) => true,
            (SeatSelected, PurchaseConfirmed) => true,
            // Lost the race at confirm time.
            (SeatSelected, Polling) => true,
            (PurchaseConfirmed, AwaitingPayment) => true,
            (AwaitingPayment, Success) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionPhase::Idle => "idle",
            AcquisitionPhase::LoggedIn => "logged_in",
            AcquisitionPhase::OnEventPage => "on_event_page",
            AcquisitionPhase::Polling => "polling",
            AcquisitionPhase::SeatSelected => "seat_selected",
            AcquisitionPhase::PurchaseConfirmed => "purchase_confirmed",
            AcquisitionPhase::AwaitingPayment => "awaiting_payment",
            AcquisitionPhase::Success => "success",
            AcquisitionPhase::Failed => "failed",
            AcquisitionPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AcquisitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Credentials rejected or the login flow broke. Never retried.
    LoginFailed,
    /// The event page could not be opened within the retry budget.
    NavigationFailed,
    /// No payment-success signal before the payment deadline. Never retried.
    PaymentTimeout,
    /// Too many seat-selection / confirm failures.
    Exhausted,
    /// The optional overall polling deadline passed.
    PollTimeout,
    /// The run broke its own phase graph.
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::LoginFailed => "login_failed",
            FailureReason::NavigationFailed => "navigation_failed",
            FailureReason::PaymentTimeout => "payment_timeout",
            FailureReason::Exhausted => "exhausted",
            FailureReason::PollTimeout => "poll_timeout",
            FailureReason::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a run. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        order_ref: String,
    },
    Failed {
        reason: FailureReason,
        detail: String,
    },
    Cancelled,
}

impl RunOutcome {
    pub fn failed(reason: FailureReason, detail: impl std::fmt::Display) -> Self {
        RunOutcome::Failed {
            reason,
            detail: detail.to_string(),
        }
    }

    /// Terminal phase matching this outcome.
    pub fn phase(&self) -> AcquisitionPhase {
        match self {
            RunOutcome::Success { .. } => AcquisitionPhase::Success,
            RunOutcome::Failed { .. } => AcquisitionPhase::Failed,
            RunOutcome::Cancelled => AcquisitionPhase::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            RunOutcome::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Tag used for the generic "any available seat" fallback.
pub const ANY_SEAT_TAG: &str = "any";

/// Seat the policy settled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSelection {
    pub tag: String,
    /// False when the generic fallback was used.
    pub was_preferred: bool,
}

impl SeatSelection {
    pub fn preferred(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            was_preferred: true,
        }
    }

    pub fn fallback() -> Self {
        Self {
            tag: ANY_SEAT_TAG.to_string(),
            was_preferred: false,
        }
    }
}

/// Errors raised by the acquisition core.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        from: AcquisitionPhase,
        to: AcquisitionPhase,
    },

    #[error("No seat selectable (tried: {})", tried.join(", "))]
    NoSeatSelectable { tried: Vec<String> },

    #[error("Cancelled")]
    Cancelled,
}

/// State of one end-to-end acquisition attempt.
///
/// Owned by whoever started the run; the machine mutates it in place and
/// hands it back once a terminal phase is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRun {
    pub id: String,
    pub event_id: String,
    pub phase: AcquisitionPhase,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub poll_cycles: u32,
    pub soft_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SeatSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    /// Every phase entered, in order, starting with `Idle`.
    pub history: Vec<AcquisitionPhase>,
}

impl AcquisitionRun {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            phase: AcquisitionPhase::Idle,
            started_at: Utc::now(),
            finished_at: None,
            poll_cycles: 0,
            soft_failures: 0,
            last_error: None,
            selection: None,
            outcome: None,
            history: vec![AcquisitionPhase::Idle],
        }
    }

    /// Move to `next`, returning the phase that was left.
    pub fn transition(
        &mut self,
        next: AcquisitionPhase,
    ) -> Result<AcquisitionPhase, AcquisitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(AcquisitionError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        let previous = self.phase;
        self.phase = next;
        self.history.push(next);
        Ok(previous)
    }

    /// Enter the terminal phase for `outcome` and record it.
    pub fn finish(&mut self, outcome: RunOutcome) -> Result<AcquisitionPhase, AcquisitionError> {
        let previous = self.transition(outcome.phase())?;
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
        Ok(previous)
    }

    /// Count a transient failure and remember its message.
    pub fn record_soft_failure(&mut self, error: impl Into<String>) -> u32 {
        self.soft_failures += 1;
        self.last_error = Some(error.into());
        self.soft_failures
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the run ever reached `phase`.
    pub fn visited(&self, phase: AcquisitionPhase) -> bool {
        self.history.contains(&phase)
    }
}
