use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::notify::Notifier;

use super::{EventEnvelope, EventHandle, EventRecord, EventStore};

/// Background task that receives run events, logs them, stores them and
/// forwards the notable ones to notifiers
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
    store: Option<Arc<dyn EventStore>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl EventWriter {
    pub fn new(
        rx: mpsc::Receiver<EventEnvelope>,
        store: Option<Arc<dyn EventStore>>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            rx,
            store,
            notifiers,
        }
    }

    /// Run the writer until every handle has been dropped
    ///
    /// Spawn this as a background task.
    pub async fn run(mut self) {
        tracing::debug!(
            "Event writer started ({} notifiers, journal {})",
            self.notifiers.len(),
            if self.store.is_some() { "on" } else { "off" }
        );

        while let Some(envelope) = self.rx.recv().await {
            tracing::debug!(
                run_id = %envelope.run_id,
                phase = %envelope.phase,
                event_type = envelope.event.event_type(),
                "run event"
            );

            if let Some((title, message)) = envelope.event.notification() {
                self.notify(&title, &message).await;
            }

            if let Some(store) = &self.store {
                if let Err(e) = store.insert(&EventRecord::from(envelope)) {
                    tracing::error!("Failed to write run event: {}", e);
                }
            }
        }

        tracing::debug!("Event writer shutting down");
    }

    async fn notify(&self, title: &str, message: &str) {
        let deliveries = self
            .notifiers
            .iter()
            .map(|notifier| async move { (notifier.name(), notifier.notify(title, message).await) });

        for (name, result) in join_all(deliveries).await {
            if let Err(e) = result {
                tracing::warn!("{} notification failed: {}", name, e);
            }
        }
    }
}

/// Create a complete event system
///
/// Returns:
/// - `EventHandle` - for emitting events (clone to share)
/// - `EventWriter` - spawn with `tokio::spawn(writer.run())`
pub fn create_event_system(
    store: Option<Arc<dyn EventStore>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = EventHandle::new(tx);
    let writer = EventWriter::new(rx, store, notifiers);
    (handle, writer)
}
