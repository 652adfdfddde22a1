use chrono::Utc;
use tokio::sync::mpsc;

use crate::acquisition::AcquisitionPhase;

use super::{AcquisitionEvent, EventEnvelope};

/// Handle for emitting run events
///
/// Cheaply cloneable. Events are sent through a channel to the EventWriter;
/// a slow or missing journal never fails the run.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity
    ///
    /// If the channel is closed the error is logged and the event dropped.
    pub async fn emit(&self, run_id: &str, phase: AcquisitionPhase, event: AcquisitionEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            phase,
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit run event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found() -> AcquisitionEvent {
        AcquisitionEvent::TicketFound {
            event_id: "c-1".to_string(),
            poll_cycle: 1,
        }
    }

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = EventHandle::new(tx);

        handle.emit("run-1", AcquisitionPhase::Polling, found()).await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert_eq!(envelope.run_id, "run-1");
        assert_eq!(envelope.phase, AcquisitionPhase::Polling);
        assert!(matches!(envelope.event, AcquisitionEvent::TicketFound { .. }));
    }

    #[tokio::test]
    async fn test_emit_closed_channel() {
        let (tx, rx) = mpsc::channel::<EventEnvelope>(10);
        let handle = EventHandle::new(tx);
        drop(rx);

        // Logged, not propagated
        handle.emit("run-1", AcquisitionPhase::Idle, found()).await;
    }

    #[tokio::test]
    async fn test_envelope_has_timestamp() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = EventHandle::new(tx);

        let before = Utc::now();
        handle.emit("run-1", AcquisitionPhase::Idle, found()).await;
        let after = Utc::now();

        let envelope = rx.try_recv().expect("Should receive event");
        assert!(envelope.timestamp >= before);
        assert!(envelope.timestamp <= after);
    }
}
