//! Event sinks cross by weak transfer: exposing a sink never keeps it alive,
//! and a proxy whose sink is gone marks itself expired and stops calling.

use crate::access::AccessStruct;
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded, guarded_release, remote_notify};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::{Expiring, SharedBinary};
use lazy_static::lazy_static;
use participant_types::{EventSink, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

lazy_static! {
    static ref EVENT_SINKS: HandleArena<dyn EventSink> = HandleArena::new();
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct EventSinkAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub time_update_begin: unsafe extern "C" fn(Handle, i64, i64) -> InterfaceError,
    pub time_updating: unsafe extern "C" fn(Handle, i64) -> InterfaceError,
    pub time_update_end: unsafe extern "C" fn(Handle, i64) -> InterfaceError,
    pub time_reset_begin: unsafe extern "C" fn(Handle, i64, i64) -> InterfaceError,
    pub time_reset_end: unsafe extern "C" fn(Handle, i64) -> InterfaceError,
}

unsafe impl AccessStruct for EventSinkAccess {}

pub fn expose_event_sink(transfer: Transfer<dyn EventSink>) -> EventSinkAccess {
    let handle = EVENT_SINKS.admit(transfer);
    EventSinkAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_event_sink),
        time_update_begin: sink_time_update_begin,
        time_updating: sink_time_updating,
        time_update_end: sink_time_update_end,
        time_reset_begin: sink_time_reset_begin,
        time_reset_end: sink_time_reset_end,
    }
}

/// Identity of a sink exposed earlier, used to unregister it remotely.
pub fn exposed_event_sink(sink: &Weak<dyn EventSink>) -> Option<DestructorAccess> {
    EVENT_SINKS
        .find_weak(sink)
        .map(|handle| DestructorAccess::new(handle, destroy_event_sink))
}

/// Number of sinks currently exposed by this binary.
pub fn exposed_event_sink_count() -> usize {
    EVENT_SINKS.len()
}

unsafe extern "C" fn destroy_event_sink(handle: Handle) {
    guarded_release(handle, || {
        EVENT_SINKS.release(handle);
    });
}

unsafe extern "C" fn sink_time_update_begin(handle: Handle, old: i64, new: i64) -> InterfaceError {
    guarded(&EVENT_SINKS, handle, true, |sink| {
        sink.time_update_begin(Timestamp::from_nanos(old), Timestamp::from_nanos(new));
    })
}

unsafe extern "C" fn sink_time_updating(handle: Handle, new: i64) -> InterfaceError {
    guarded(&EVENT_SINKS, handle, true, |sink| {
        sink.time_updating(Timestamp::from_nanos(new));
    })
}

unsafe extern "C" fn sink_time_update_end(handle: Handle, new: i64) -> InterfaceError {
    guarded(&EVENT_SINKS, handle, true, |sink| {
        sink.time_update_end(Timestamp::from_nanos(new));
    })
}

unsafe extern "C" fn sink_time_reset_begin(handle: Handle, old: i64, new: i64) -> InterfaceError {
    guarded(&EVENT_SINKS, handle, true, |sink| {
        sink.time_reset_begin(Timestamp::from_nanos(old), Timestamp::from_nanos(new));
    })
}

unsafe extern "C" fn sink_time_reset_end(handle: Handle, new: i64) -> InterfaceError {
    guarded(&EVENT_SINKS, handle, true, |sink| {
        sink.time_reset_end(Timestamp::from_nanos(new));
    })
}

/// Local [`EventSink`] forwarding to a sink in another binary.
pub struct EventSinkProxy {
    access: EventSinkAccess,
    expired: AtomicBool,
    _destruction: DestructionManager,
    _binary: Option<SharedBinary>,
}

impl EventSinkProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_event_sink`] in a live binary.
    pub unsafe fn from_access(access: EventSinkAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            expired: AtomicBool::new(false),
            _destruction: DestructionManager::with(access.destructor),
            _binary: binary,
        }
    }

    fn forward(&self, what: &str, call: impl FnOnce(Handle) -> InterfaceError) {
        if self.is_expired() {
            return;
        }
        let code = call(self.access.handle);
        if code == InterfaceError::InvalidHandle {
            self.expired.store(true, Ordering::Release);
        }
        remote_notify(what, code);
    }
}

impl Expiring for EventSinkProxy {
    fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }
}

impl EventSink for EventSinkProxy {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        self.forward("time_update_begin", |handle| unsafe {
            (self.access.time_update_begin)(handle, old_time.as_nanos(), new_time.as_nanos())
        });
    }

    fn time_updating(&self, new_time: Timestamp) {
        self.forward("time_updating", |handle| unsafe {
            (self.access.time_updating)(handle, new_time.as_nanos())
        });
    }

    fn time_update_end(&self, new_time: Timestamp) {
        self.forward("time_update_end", |handle| unsafe {
            (self.access.time_update_end)(handle, new_time.as_nanos())
        });
    }

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        self.forward("time_reset_begin", |handle| unsafe {
            (self.access.time_reset_begin)(handle, old_time.as_nanos(), new_time.as_nanos())
        });
    }

    fn time_reset_end(&self, new_time: Timestamp) {
        self.forward("time_reset_end", |handle| unsafe {
            (self.access.time_reset_end)(handle, new_time.as_nanos())
        });
    }
}
