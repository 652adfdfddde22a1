//! Ticket acquisition: phases, polling, seat policy and the state machine.

mod config;
mod machine;
mod poller;
mod seat;
mod types;

pub use config::AcquisitionConfig;
pub use machine::AcquisitionMachine;
pub use poller::{scan_indicators, AvailabilityIndicator, AvailabilityPoller, PollOutcome};
pub use seat::select_seat;
pub use types::*;
