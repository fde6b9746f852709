//! Event sink bookkeeping.
//!
//! [`SinkSlot`] is the single sink a clock emits into. [`EventSinkList`] is
//! the clock service's fan-out to every registered sink. Both hold sinks
//! weakly and never hold a lock while a sink runs.

use parking_lot::Mutex;
use participant_types::{ClockEvent, EventSink, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use tracing::debug;

#[derive(Default)]
pub struct SinkSlot {
    sink: Mutex<Option<Weak<dyn EventSink>>>,
}

impl SinkSlot {
    pub fn set(&self, sink: Weak<dyn EventSink>) {
        *self.sink.lock() = Some(sink);
    }

    pub fn clear(&self) {
        self.sink.lock().take();
    }

    /// Deliver `event`; `false` if there is no live sink.
    pub fn emit(&self, event: ClockEvent) -> bool {
        let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => {
                event.dispatch(sink.as_ref());
                true
            }
            None => false,
        }
    }

    pub fn emit_reset(&self, old: Timestamp, new: Timestamp) {
        self.emit(ClockEvent::ResetBegin { old, new });
        self.emit(ClockEvent::ResetEnd { new });
    }

    pub fn emit_update(&self, old: Timestamp, new: Timestamp) {
        self.emit(ClockEvent::UpdateBegin { old, new });
        self.emit(ClockEvent::Updating { new });
        self.emit(ClockEvent::UpdateEnd { new });
    }
}

/// Weakly held sinks receiving every event of the main clock.
#[derive(Default)]
pub struct EventSinkList {
    sinks: Mutex<Vec<Weak<dyn EventSink>>>,
    dispatched: AtomicU64,
}

impl EventSinkList {
    /// Returns `false` if the sink was already registered.
    pub fn register(&self, sink: Weak<dyn EventSink>) -> bool {
        let mut sinks = self.sinks.lock();
        if sinks.iter().any(|known| Weak::ptr_eq(known, &sink)) {
            return false;
        }
        sinks.push(sink);
        true
    }

    /// Returns `false` if the sink was not registered.
    pub fn unregister(&self, sink: &Weak<dyn EventSink>) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|known| !Weak::ptr_eq(known, sink));
        sinks.len() != before
    }

    /// Sinks that are still alive.
    pub fn len(&self) -> usize {
        self.sinks
            .lock()
            .iter()
            .filter(|sink| sink.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events dispatched, counted once per event.
    pub fn events_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every live sink; returns how many received it.
    pub fn dispatch(&self, event: ClockEvent) -> usize {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let sinks = self.sinks.lock().clone();

        let mut delivered = 0;
        let mut expired = false;
        for sink in &sinks {
            match sink.upgrade() {
                Some(sink) => {
                    event.dispatch(sink.as_ref());
                    delivered += 1;
                }
                None => expired = true,
            }
        }

        if expired {
            self.sinks.lock().retain(|sink| sink.strong_count() > 0);
            debug!("[ClockService] Purged expired event sinks");
        }
        delivered
    }
}
