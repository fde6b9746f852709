//! # Clock Service Crate
//!
//! The participant's time sources.
//!
//! | Clock | Type | Driven by |
//! |-------|------|-----------|
//! | `local_system_realtime` | continuous | sampling thread over wall time |
//! | `local_system_simtime` | discrete | step timer or external driver |
//! | [`SyncClock`] | either | events of an external timing master |
//! | registered clocks | either | their own implementation |
//!
//! [`ClockServiceComponent`] selects the main clock by the
//! `clock/main_clock` property and forwards its events to sinks.

pub mod realtime;
pub mod service;
pub mod simtime;
pub mod sinks;
pub mod sync;
mod timer;

pub use realtime::LocalSystemRealtimeClock;
pub use service::ClockServiceComponent;
pub use simtime::{DiscreteDrive, LocalSystemSimtimeClock, SimtimeSettings};
pub use sinks::{EventSinkList, SinkSlot};
pub use sync::{MasterEvent, SyncClock};
