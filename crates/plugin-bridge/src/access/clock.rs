//! Clock access. Clocks cross by shared transfer; the sink a clock is
//! started with crosses weakly and is kept by [`CLOCK_SINKS`] until the
//! next start or until the clock is released.

use crate::access::event_sink::{expose_event_sink, EventSinkAccess, EventSinkProxy};
use crate::access::AccessStruct;
use crate::callbacks::{ResultSink, StringSink};
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded, guarded_release, guarded_result, remote_notify, remote_result, remote_transfer};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::{ProxyKeeper, SharedBinary};
use lazy_static::lazy_static;
use participant_types::{Clock, ClockType, EventSink, Result, Timestamp};
use std::sync::{Arc, Weak};

lazy_static! {
    static ref CLOCKS: HandleArena<dyn Clock> = HandleArena::new();
    static ref CLOCK_SINKS: ProxyKeeper<EventSinkProxy> = ProxyKeeper::new();
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ClockAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub get_name: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
    pub get_type: unsafe extern "C" fn(Handle, *mut i32) -> InterfaceError,
    pub get_time: unsafe extern "C" fn(Handle, *mut i64) -> InterfaceError,
    pub reset: unsafe extern "C" fn(Handle, i64) -> InterfaceError,
    pub start: unsafe extern "C" fn(Handle, ResultSink, EventSinkAccess) -> InterfaceError,
    pub stop: unsafe extern "C" fn(Handle, ResultSink) -> InterfaceError,
}

unsafe impl AccessStruct for ClockAccess {}

pub fn expose_clock(transfer: Transfer<dyn Clock>) -> ClockAccess {
    let handle = CLOCKS.admit(transfer);
    ClockAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_clock),
        get_name: clock_get_name,
        get_type: clock_get_type,
        get_time: clock_get_time,
        reset: clock_reset,
        start: clock_start,
        stop: clock_stop,
    }
}

unsafe extern "C" fn destroy_clock(handle: Handle) {
    guarded_release(handle, || {
        CLOCK_SINKS.release_owner(handle);
        CLOCKS.release(handle);
    });
}

unsafe extern "C" fn clock_get_name(handle: Handle, name: StringSink) -> InterfaceError {
    guarded(&CLOCKS, handle, name.is_valid(), |clock| {
        let value = clock.name();
        name.deliver(&value);
    })
}

unsafe extern "C" fn clock_get_type(handle: Handle, clock_type: *mut i32) -> InterfaceError {
    guarded(&CLOCKS, handle, !clock_type.is_null(), |clock| {
        let value = clock.clock_type() as i32;
        *clock_type = value;
    })
}

unsafe extern "C" fn clock_get_time(handle: Handle, time: *mut i64) -> InterfaceError {
    guarded(&CLOCKS, handle, !time.is_null(), |clock| {
        let value = clock.time().as_nanos();
        *time = value;
    })
}

unsafe extern "C" fn clock_reset(handle: Handle, new_time: i64) -> InterfaceError {
    guarded(&CLOCKS, handle, true, |clock| {
        clock.reset(Timestamp::from_nanos(new_time));
    })
}

unsafe extern "C" fn clock_start(
    handle: Handle,
    result: ResultSink,
    sink: EventSinkAccess,
) -> InterfaceError {
    guarded_result(&CLOCKS, handle, result, |clock| {
        let proxy = CLOCK_SINKS.replace(
            handle,
            sink.destructor.key(),
            EventSinkProxy::from_access(sink, None),
        );
        let weak: Weak<dyn EventSink> = Arc::downgrade(&proxy) as Weak<dyn EventSink>;
        clock.start(weak)
    })
}

unsafe extern "C" fn clock_stop(handle: Handle, result: ResultSink) -> InterfaceError {
    guarded_result(&CLOCKS, handle, result, |clock| clock.stop())
}

/// Local [`Clock`] forwarding to a clock in another binary.
pub struct ClockProxy {
    access: ClockAccess,
    _destruction: DestructionManager,
    _binary: Option<SharedBinary>,
}

impl ClockProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_clock`] in a live binary.
    pub unsafe fn from_access(access: ClockAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            _binary: binary,
        }
    }
}

impl Clock for ClockProxy {
    fn name(&self) -> String {
        let mut name = None;
        let code = unsafe { (self.access.get_name)(self.access.handle, StringSink::single(&mut name)) };
        remote_notify("get_name", code);
        name.unwrap_or_default()
    }

    fn clock_type(&self) -> ClockType {
        let mut raw = ClockType::Continuous as i32;
        let code = unsafe { (self.access.get_type)(self.access.handle, &mut raw) };
        remote_notify("get_type", code);
        ClockType::from_i32(raw).unwrap_or(ClockType::Continuous)
    }

    fn time(&self) -> Timestamp {
        let mut nanos = 0;
        let code = unsafe { (self.access.get_time)(self.access.handle, &mut nanos) };
        remote_notify("get_time", code);
        Timestamp::from_nanos(nanos)
    }

    fn reset(&self, new_time: Timestamp) {
        let code = unsafe { (self.access.reset)(self.access.handle, new_time.as_nanos()) };
        remote_notify("reset", code);
    }

    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        let sink = expose_event_sink(Transfer::Weak(event_sink));
        remote_transfer(sink.destructor, |result| unsafe {
            (self.access.start)(self.access.handle, result, sink)
        })
    }

    fn stop(&self) -> Result<()> {
        remote_result(|result| unsafe { (self.access.stop)(self.access.handle, result) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::event_sink::exposed_event_sink;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stepper {
        time: Mutex<Timestamp>,
        sink: Mutex<Option<Weak<dyn EventSink>>>,
    }

    impl Stepper {
        fn new() -> Self {
            Self {
                time: Mutex::new(Timestamp::ZERO),
                sink: Mutex::new(None),
            }
        }

        fn step(&self, to: Timestamp) {
            let old = std::mem::replace(&mut *self.time.lock(), to);
            let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
            if let Some(sink) = sink {
                sink.time_update_begin(old, to);
                sink.time_updating(to);
                sink.time_update_end(to);
            }
        }
    }

    impl Clock for Stepper {
        fn name(&self) -> String {
            "stepper".to_string()
        }
        fn clock_type(&self) -> ClockType {
            ClockType::Discrete
        }
        fn time(&self) -> Timestamp {
            *self.time.lock()
        }
        fn reset(&self, new_time: Timestamp) {
            *self.time.lock() = new_time;
        }
        fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
            if let Some(sink) = event_sink.upgrade() {
                sink.time_reset_begin(self.time(), self.time());
                sink.time_reset_end(self.time());
            }
            *self.sink.lock() = Some(event_sink);
            Ok(())
        }
        fn stop(&self) -> Result<()> {
            *self.sink.lock() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl EventSink for Counting {
        fn time_update_begin(&self, _old: Timestamp, _new: Timestamp) {}
        fn time_updating(&self, _new: Timestamp) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn time_update_end(&self, _new: Timestamp) {}
        fn time_reset_begin(&self, _old: Timestamp, _new: Timestamp) {}
        fn time_reset_end(&self, _new: Timestamp) {
            self.0.fetch_add(100, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_clock_roundtrip_through_proxy() {
        let clock = Arc::new(Stepper::new());
        let proxy = unsafe {
            ClockProxy::from_access(expose_clock(Transfer::Shared(clock.clone() as Arc<dyn Clock>)), None)
        };

        assert_eq!(proxy.name(), "stepper");
        assert_eq!(proxy.clock_type(), ClockType::Discrete);
        proxy.reset(Timestamp::from_millis(40));
        assert_eq!(proxy.time(), Timestamp::from_millis(40));

        let counting = Arc::new(Counting::default());
        let weak: Weak<dyn EventSink> = Arc::downgrade(&counting) as Weak<dyn EventSink>;
        proxy.start(weak.clone()).expect("start");
        clock.step(Timestamp::from_millis(50));
        clock.step(Timestamp::from_millis(60));
        assert_eq!(counting.0.load(Ordering::SeqCst), 102);

        proxy.stop().expect("stop");
        drop(proxy);
        assert_eq!(Arc::strong_count(&clock), 1);
        assert!(exposed_event_sink(&weak).is_none());
    }
}
