use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionPhase, FailureReason};
use crate::config::SiteId;

/// Events produced while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    RunStarted {
        event_id: String,
        event_name: String,
        site: SiteId,
    },
    PhaseChanged {
        from: AcquisitionPhase,
        to: AcquisitionPhase,
    },
    TicketFound {
        event_id: String,
        poll_cycle: u32,
    },
    SeatSelected {
        tag: String,
        was_preferred: bool,
    },
    /// Seat selection or confirmation failed; the run went back to polling.
    SoftFailure {
        error: String,
        soft_failures: u32,
    },
    PurchaseSucceeded {
        event_id: String,
        order_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seat_tag: Option<String>,
    },
    PurchaseFailed {
        event_id: String,
        reason: FailureReason,
        detail: String,
    },
    RunCancelled {
        event_id: String,
        phase: AcquisitionPhase,
    },
}

impl AcquisitionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AcquisitionEvent::RunStarted { .. } => "run_started",
            AcquisitionEvent::PhaseChanged { .. } => "phase_changed",
            AcquisitionEvent::TicketFound { .. } => "ticket_found",
            AcquisitionEvent::SeatSelected { .. } => "seat_selected",
            AcquisitionEvent::SoftFailure { .. } => "soft_failure",
            AcquisitionEvent::PurchaseSucceeded { .. } => "purchase_succeeded",
            AcquisitionEvent::PurchaseFailed { .. } => "purchase_failed",
            AcquisitionEvent::RunCancelled { .. } => "run_cancelled",
        }
    }

    /// Title and message for events a human should hear about right away.
    pub fn notification(&self) -> Option<(String, String)> {
        match self {
            AcquisitionEvent::TicketFound { event_id, .. } => Some((
                "Tickets available".to_string(),
                format!("Seats opened up for {}, trying to grab one", event_id),
            )),
            AcquisitionEvent::PurchaseSucceeded {
                event_id,
                order_ref,
                seat_tag,
            } => Some((
                "Ticket secured".to_string(),
                match seat_tag {
                    Some(tag) => format!("{}: order {} (seat {})", event_id, order_ref, tag),
                    None => format!("{}: order {}", event_id, order_ref),
                },
            )),
            AcquisitionEvent::PurchaseFailed {
                event_id,
                reason,
                detail,
            } => Some((
                "Ticket purchase failed".to_string(),
                format!("{}: {} ({})", event_id, reason, detail),
            )),
            _ => None,
        }
    }
}

/// Envelope wrapping an event with run metadata.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    /// Phase of the run when the event was emitted.
    pub phase: AcquisitionPhase,
    pub event: AcquisitionEvent,
}

/// A persisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub event_type: String,
    pub phase: AcquisitionPhase,
    pub data: AcquisitionEvent,
}

impl From<EventEnvelope> for EventRecord {
    fn from(envelope: EventEnvelope) -> Self {
        Self {
            id: 0,
            timestamp: envelope.timestamp,
            run_id: envelope.run_id,
            event_type: envelope.event.event_type().to_string(),
            phase: envelope.phase,
            data: envelope.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AcquisitionEvent::PhaseChanged {
            from: AcquisitionPhase::Polling,
            to: AcquisitionPhase::SeatSelected,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["from"], "polling");
        assert_eq!(json["to"], "seat_selected");

        let back: AcquisitionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = AcquisitionEvent::PurchaseFailed {
            event_id: "c-1".to_string(),
            reason: FailureReason::PaymentTimeout,
            detail: "timeout".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["reason"], "payment_timeout");
    }

    #[test]
    fn test_only_notable_events_notify() {
        let found = AcquisitionEvent::TicketFound {
            event_id: "c-1".to_string(),
            poll_cycle: 4,
        };
        assert!(found.notification().is_some());

        let success = AcquisitionEvent::PurchaseSucceeded {
            event_id: "c-1".to_string(),
            order_ref: "o-9".to_string(),
            seat_tag: Some("VIP".to_string()),
        };
        let (title, message) = success.notification().unwrap();
        assert_eq!(title, "Ticket secured");
        assert_eq!(message, "c-1: order o-9 (seat VIP)");

        let phase = AcquisitionEvent::PhaseChanged {
            from: AcquisitionPhase::Idle,
            to: AcquisitionPhase::LoggedIn,
        };
        assert!(phase.notification().is_none());
    }

    #[test]
    fn test_record_from_envelope() {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            run_id: "run-1".to_string(),
            phase: AcquisitionPhase::Polling,
            event: AcquisitionEvent::SoftFailure {
                error: "seat gone".to_string(),
                soft_failures: 1,
            },
        };
        let record = EventRecord::from(envelope);
        assert_eq!(record.id, 0);
        assert_eq!(record.event_type, "soft_failure");
        assert_eq!(record.phase, AcquisitionPhase::Polling);
    }
}
