//! # Clock Interfaces
//!
//! Clocks are named time sources of type continuous or discrete. The clock
//! service owns the registered clocks, selects one as main clock, and
//! forwards its time events to weakly held [`EventSink`]s.
//!
//! ## Event Order
//!
//! ```text
//! start:    time_reset_begin(old, new) → time_reset_end(new)
//! advance:  time_update_begin(old, new) → time_updating(new) → time_update_end(new)
//! ```
//!
//! Every `start` emits exactly one reset sequence before any update.

use crate::component::{Component, ComponentInterface};
use crate::errors::Result;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Name of the native wall-clock driven continuous clock.
pub const LOCAL_SYSTEM_REALTIME: &str = "local_system_realtime";

/// Name of the native fixed-step discrete clock.
pub const LOCAL_SYSTEM_SIMTIME: &str = "local_system_simtime";

/// How a clock advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ClockType {
    /// Time is sampled; it advances with wall time.
    Continuous = 0,
    /// Time advances in explicit steps.
    Discrete = 1,
}

impl ClockType {
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Continuous),
            1 => Some(Self::Discrete),
            _ => None,
        }
    }
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => f.write_str("continuous"),
            Self::Discrete => f.write_str("discrete"),
        }
    }
}

/// Consumer of clock time events.
pub trait EventSink: Send + Sync {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp);

    fn time_updating(&self, new_time: Timestamp);

    fn time_update_end(&self, new_time: Timestamp);

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp);

    fn time_reset_end(&self, new_time: Timestamp);
}

/// One clock event, in value form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockEvent {
    UpdateBegin { old: Timestamp, new: Timestamp },
    Updating { new: Timestamp },
    UpdateEnd { new: Timestamp },
    ResetBegin { old: Timestamp, new: Timestamp },
    ResetEnd { new: Timestamp },
}

impl ClockEvent {
    /// Deliver this event to `sink`.
    pub fn dispatch(&self, sink: &dyn EventSink) {
        match *self {
            Self::UpdateBegin { old, new } => sink.time_update_begin(old, new),
            Self::Updating { new } => sink.time_updating(new),
            Self::UpdateEnd { new } => sink.time_update_end(new),
            Self::ResetBegin { old, new } => sink.time_reset_begin(old, new),
            Self::ResetEnd { new } => sink.time_reset_end(new),
        }
    }

    /// The time this event moves to.
    #[must_use]
    pub fn new_time(&self) -> Timestamp {
        match *self {
            Self::UpdateBegin { new, .. }
            | Self::Updating { new }
            | Self::UpdateEnd { new }
            | Self::ResetBegin { new, .. }
            | Self::ResetEnd { new } => new,
        }
    }
}

/// A named time source.
pub trait Clock: Send + Sync {
    fn name(&self) -> String;

    fn clock_type(&self) -> ClockType;

    /// Current time of this clock.
    fn time(&self) -> Timestamp;

    /// Set the clock to `new_time`, emitting a reset sequence if running.
    fn reset(&self, new_time: Timestamp);

    /// Start emitting events to `event_sink`. Emits the reset sequence first.
    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()>;

    /// Stop emitting events. An in-flight dispatch completes.
    fn stop(&self) -> Result<()>;
}

/// Owner of the participant's clocks.
pub trait ClockService: Component {
    /// Time of the main clock, or [`Timestamp::ZERO`] if not started.
    fn time(&self) -> Timestamp;

    /// Time of the named clock; `None` (and a warning) if unknown.
    fn time_of(&self, clock_name: &str) -> Option<Timestamp>;

    /// Type of the main clock.
    fn clock_type(&self) -> ClockType;

    /// Type of the named clock; `None` (and a warning) if unknown.
    fn clock_type_of(&self, clock_name: &str) -> Option<ClockType>;

    fn main_clock_name(&self) -> String;

    /// Register a sink for all future events. Held weakly.
    fn register_event_sink(&self, event_sink: Weak<dyn EventSink>) -> Result<()>;

    fn unregister_event_sink(&self, event_sink: &Weak<dyn EventSink>) -> Result<()>;

    /// Register a clock. Fails with `invalid_state` while started.
    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<()>;

    /// Unregister a clock. Fails with `invalid_state` while started.
    fn unregister_clock(&self, clock_name: &str) -> Result<()>;

    /// Names of all registered clocks, sorted.
    fn clock_names(&self) -> Vec<String>;

    fn find_clock(&self, clock_name: &str) -> Option<Arc<dyn Clock>>;
}

impl ComponentInterface for dyn ClockService {
    const IID: &'static str = "clock_service.arya.participant.iid";
}
