pub mod acquisition;
pub mod api;
pub mod config;
pub mod driver;
pub mod events;
pub mod notify;
pub mod site;
pub mod testing;

pub use acquisition::{
    AcquisitionConfig, AcquisitionMachine, AcquisitionPhase, AcquisitionRun, FailureReason,
    RunOutcome, SeatSelection,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, Credentials,
    EventTarget, LoggingConfig, SanitizedConfig, SiteId, SiteMode,
};
pub use events::{create_event_system, EventHandle, EventStore, SqliteEventStore};
pub use site::{create_browser_adapter, ApiSiteAdapter, SiteAdapter, SiteError};
