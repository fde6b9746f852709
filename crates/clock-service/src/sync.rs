//! # Sync Clock
//!
//! A clock driven by an external timing master. The transport delivering
//! master events is not part of this crate; whatever receives them calls
//! [`SyncClock::on_master_event`].
//!
//! As a continuous clock it interpolates between master updates with local
//! wall time. As a discrete clock it reports the last master time exactly.

use crate::sinks::SinkSlot;
use parking_lot::Mutex;
use participant_types::{
    Clock, ClockEvent, ClockType, EventSink, ParticipantError, Result, Timestamp,
};
use std::sync::Weak;
use std::time::Instant;
use tracing::{debug, info};

/// Event received from the timing master.
pub type MasterEvent = ClockEvent;

pub const SLAVE_MASTER_ON_DEMAND: &str = "slave_master_on_demand";
pub const SLAVE_MASTER_ON_DEMAND_DISCRETE: &str = "slave_master_on_demand_discrete";

struct SyncState {
    master_time: Timestamp,
    received_at: Option<Instant>,
    running: bool,
}

pub struct SyncClock {
    name: String,
    clock_type: ClockType,
    state: Mutex<SyncState>,
    sink: SinkSlot,
}

impl SyncClock {
    pub fn new(name: impl Into<String>, clock_type: ClockType) -> Self {
        Self {
            name: name.into(),
            clock_type,
            state: Mutex::new(SyncState {
                master_time: Timestamp::ZERO,
                received_at: None,
                running: false,
            }),
            sink: SinkSlot::default(),
        }
    }

    /// Continuous sync clock under its conventional name.
    pub fn continuous() -> Self {
        Self::new(SLAVE_MASTER_ON_DEMAND, ClockType::Continuous)
    }

    /// Discrete sync clock under its conventional name.
    pub fn discrete() -> Self {
        Self::new(SLAVE_MASTER_ON_DEMAND_DISCRETE, ClockType::Discrete)
    }

    /// Adopt the master's time and forward the event while running.
    pub fn on_master_event(&self, event: MasterEvent) {
        let running = {
            let mut state = self.state.lock();
            state.master_time = event.new_time();
            state.received_at = Some(Instant::now());
            state.running
        };
        if running {
            self.sink.emit(event);
        } else {
            debug!(clock = %self.name, ?event, "[ClockService] Master event while stopped");
        }
    }

    fn current(&self, state: &SyncState) -> Timestamp {
        match (self.clock_type, state.running, state.received_at) {
            (ClockType::Continuous, true, Some(received_at)) => {
                state.master_time + received_at.elapsed()
            }
            _ => state.master_time,
        }
    }
}

impl Clock for SyncClock {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn clock_type(&self) -> ClockType {
        self.clock_type
    }

    fn time(&self) -> Timestamp {
        let state = self.state.lock();
        self.current(&state)
    }

    fn reset(&self, new_time: Timestamp) {
        let (old, running) = {
            let mut state = self.state.lock();
            let old = self.current(&state);
            state.master_time = new_time;
            state.received_at = Some(Instant::now());
            (old, state.running)
        };
        if running {
            self.sink.emit_reset(old, new_time);
        }
    }

    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        let (old, new) = {
            let mut state = self.state.lock();
            if state.running {
                return Err(ParticipantError::invalid_state(format!(
                    "clock '{}' is already running",
                    self.name
                )));
            }
            let old = state.master_time;
            state.running = true;
            state.received_at = Some(Instant::now());
            (old, state.master_time)
        };
        self.sink.set(event_sink);
        self.sink.emit_reset(old, new);
        info!(clock = %self.name, clock_type = %self.clock_type, "[ClockService] Sync clock started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            let at = self.current(&state);
            state.master_time = at;
            state.running = false;
        }
        self.sink.clear();
        Ok(())
    }
}
