use thiserror::Error;

use super::EventRecord;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying stored events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub run_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Trait for run event storage
pub trait EventStore: Send + Sync {
    /// Insert a record, returns the assigned ID
    fn insert(&self, record: &EventRecord) -> Result<i64, EventStoreError>;

    /// Query records in emission order
    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventStoreError>;

    /// Count matching records
    fn count(&self, filter: &EventFilter) -> Result<i64, EventStoreError>;
}
