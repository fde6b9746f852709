//! Clock service access.
//!
//! ```text
//! register_event_sink:  sink ──weak──▶ SERVICE_SINKS (kept per service handle)
//! register_clock:       clock ──shared──▶ ClockProxy owned by the service
//! find_clock:           clock ──shared──▶ caller, null handle if unknown
//! ```

use crate::access::clock::{expose_clock, ClockAccess, ClockProxy};
use crate::access::event_sink::{exposed_event_sink, expose_event_sink, EventSinkAccess, EventSinkProxy};
use crate::access::{receive_access, str_parts, write_access, AccessStruct};
use crate::callbacks::{read_str, ResultSink, StringSink};
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{
    guarded, guarded_release, guarded_result, remote_notify, remote_result, remote_transfer,
};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::{ProxyKeeper, SharedBinary};
use lazy_static::lazy_static;
use participant_types::{
    Clock, ClockService, ClockType, Component, ComponentInterface, EventSink, ParticipantError,
    Result, Timestamp,
};
use std::ffi::c_void;
use std::sync::{Arc, Weak};

lazy_static! {
    static ref CLOCK_SERVICES: HandleArena<dyn ClockService> = HandleArena::new();
    static ref SERVICE_SINKS: ProxyKeeper<EventSinkProxy> = ProxyKeeper::new();
}

type LookupFn<T> = unsafe extern "C" fn(Handle, *const u8, usize, *mut T, *mut bool) -> InterfaceError;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ClockServiceAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub get_time: unsafe extern "C" fn(Handle, *mut i64) -> InterfaceError,
    pub get_time_of: LookupFn<i64>,
    pub get_type: unsafe extern "C" fn(Handle, *mut i32) -> InterfaceError,
    pub get_type_of: LookupFn<i32>,
    pub get_main_clock_name: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
    pub register_event_sink:
        unsafe extern "C" fn(Handle, ResultSink, EventSinkAccess) -> InterfaceError,
    pub unregister_event_sink:
        unsafe extern "C" fn(Handle, ResultSink, DestructorAccess) -> InterfaceError,
    pub register_clock: unsafe extern "C" fn(Handle, ResultSink, ClockAccess) -> InterfaceError,
    pub unregister_clock:
        unsafe extern "C" fn(Handle, ResultSink, *const u8, usize) -> InterfaceError,
    pub get_clock_names: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
    pub find_clock: unsafe extern "C" fn(Handle, *const u8, usize, *mut c_void) -> InterfaceError,
}

unsafe impl AccessStruct for ClockServiceAccess {}

pub fn expose_clock_service(service: Weak<dyn ClockService>) -> ClockServiceAccess {
    let handle = CLOCK_SERVICES.admit(Transfer::Weak(service));
    ClockServiceAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_clock_service),
        get_time: service_get_time,
        get_time_of: service_get_time_of,
        get_type: service_get_type,
        get_type_of: service_get_type_of,
        get_main_clock_name: service_get_main_clock_name,
        register_event_sink: service_register_event_sink,
        unregister_event_sink: service_unregister_event_sink,
        register_clock: service_register_clock,
        unregister_clock: service_unregister_clock,
        get_clock_names: service_get_clock_names,
        find_clock: service_find_clock,
    }
}

unsafe extern "C" fn destroy_clock_service(handle: Handle) {
    guarded_release(handle, || {
        SERVICE_SINKS.release_owner(handle);
        CLOCK_SERVICES.release(handle);
    });
}

unsafe extern "C" fn service_get_time(handle: Handle, time: *mut i64) -> InterfaceError {
    guarded(&CLOCK_SERVICES, handle, !time.is_null(), |service| {
        let value = service.time().as_nanos();
        *time = value;
    })
}

unsafe extern "C" fn service_get_time_of(
    handle: Handle,
    name: *const u8,
    name_len: usize,
    time: *mut i64,
    found: *mut bool,
) -> InterfaceError {
    let outputs_valid = !time.is_null() && !found.is_null();
    guarded(&CLOCK_SERVICES, handle, outputs_valid, |service| {
        let value = service.time_of(&read_str(name, name_len));
        *found = value.is_some();
        *time = value.unwrap_or(Timestamp::ZERO).as_nanos();
    })
}

unsafe extern "C" fn service_get_type(handle: Handle, clock_type: *mut i32) -> InterfaceError {
    guarded(&CLOCK_SERVICES, handle, !clock_type.is_null(), |service| {
        let value = service.clock_type() as i32;
        *clock_type = value;
    })
}

unsafe extern "C" fn service_get_type_of(
    handle: Handle,
    name: *const u8,
    name_len: usize,
    clock_type: *mut i32,
    found: *mut bool,
) -> InterfaceError {
    let outputs_valid = !clock_type.is_null() && !found.is_null();
    guarded(&CLOCK_SERVICES, handle, outputs_valid, |service| {
        let value = service.clock_type_of(&read_str(name, name_len));
        *found = value.is_some();
        *clock_type = value.unwrap_or(ClockType::Continuous) as i32;
    })
}

unsafe extern "C" fn service_get_main_clock_name(handle: Handle, name: StringSink) -> InterfaceError {
    guarded(&CLOCK_SERVICES, handle, name.is_valid(), |service| {
        let value = service.main_clock_name();
        name.deliver(&value);
    })
}

unsafe extern "C" fn service_register_event_sink(
    handle: Handle,
    result: ResultSink,
    sink: EventSinkAccess,
) -> InterfaceError {
    guarded_result(&CLOCK_SERVICES, handle, result, |service| {
        let key = sink.destructor.key();
        let proxy = SERVICE_SINKS.keep(handle, key, EventSinkProxy::from_access(sink, None));
        let weak: Weak<dyn EventSink> = Arc::downgrade(&proxy) as Weak<dyn EventSink>;
        service.register_event_sink(weak).map_err(|error| {
            SERVICE_SINKS.release(handle, key);
            error
        })
    })
}

unsafe extern "C" fn service_unregister_event_sink(
    handle: Handle,
    result: ResultSink,
    identity: DestructorAccess,
) -> InterfaceError {
    guarded_result(&CLOCK_SERVICES, handle, result, |service| {
        let proxy = SERVICE_SINKS
            .release(handle, identity.key())
            .ok_or_else(|| ParticipantError::not_found("event sink is not registered"))?;
        let weak: Weak<dyn EventSink> = Arc::downgrade(&proxy) as Weak<dyn EventSink>;
        service.unregister_event_sink(&weak)
    })
}

unsafe extern "C" fn service_register_clock(
    handle: Handle,
    result: ResultSink,
    clock: ClockAccess,
) -> InterfaceError {
    guarded_result(&CLOCK_SERVICES, handle, result, |service| {
        let clock: Arc<dyn Clock> = Arc::new(ClockProxy::from_access(clock, None));
        service.register_clock(clock)
    })
}

unsafe extern "C" fn service_unregister_clock(
    handle: Handle,
    result: ResultSink,
    name: *const u8,
    name_len: usize,
) -> InterfaceError {
    guarded_result(&CLOCK_SERVICES, handle, result, |service| {
        service.unregister_clock(&read_str(name, name_len))
    })
}

unsafe extern "C" fn service_get_clock_names(handle: Handle, names: StringSink) -> InterfaceError {
    guarded(&CLOCK_SERVICES, handle, names.is_valid(), |service| {
        for name in service.clock_names() {
            names.deliver(&name);
        }
    })
}

unsafe extern "C" fn service_find_clock(
    handle: Handle,
    name: *const u8,
    name_len: usize,
    out: *mut c_void,
) -> InterfaceError {
    guarded(&CLOCK_SERVICES, handle, !out.is_null(), |service| {
        if let Some(clock) = service.find_clock(&read_str(name, name_len)) {
            write_access(out, expose_clock(Transfer::Shared(clock)));
        }
    })
}

/// Local [`ClockService`] forwarding to another binary.
pub struct ClockServiceProxy {
    access: ClockServiceAccess,
    _destruction: DestructionManager,
    binary: Option<SharedBinary>,
}

impl ClockServiceProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_clock_service`] in a live binary.
    pub unsafe fn from_access(access: ClockServiceAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            binary,
        }
    }

    fn lookup<T: Copy>(&self, what: &str, call: LookupFn<T>, name: &str, fallback: T) -> Option<T> {
        let (name_ptr, name_len) = str_parts(name);
        let mut value = fallback;
        let mut found = false;
        let code = unsafe { call(self.access.handle, name_ptr, name_len, &mut value, &mut found) };
        remote_notify(what, code);
        (code.is_none() && found).then_some(value)
    }
}

impl Component for ClockServiceProxy {
    fn iid(&self) -> &str {
        <dyn ClockService as ComponentInterface>::IID
    }
}

impl ClockService for ClockServiceProxy {
    fn time(&self) -> Timestamp {
        let mut nanos = 0;
        let code = unsafe { (self.access.get_time)(self.access.handle, &mut nanos) };
        remote_notify("get_time", code);
        Timestamp::from_nanos(nanos)
    }

    fn time_of(&self, clock_name: &str) -> Option<Timestamp> {
        self.lookup("get_time_of", self.access.get_time_of, clock_name, 0)
            .map(Timestamp::from_nanos)
    }

    fn clock_type(&self) -> ClockType {
        let mut raw = ClockType::Continuous as i32;
        let code = unsafe { (self.access.get_type)(self.access.handle, &mut raw) };
        remote_notify("get_type", code);
        ClockType::from_i32(raw).unwrap_or(ClockType::Continuous)
    }

    fn clock_type_of(&self, clock_name: &str) -> Option<ClockType> {
        self.lookup(
            "get_type_of",
            self.access.get_type_of,
            clock_name,
            ClockType::Continuous as i32,
        )
        .and_then(ClockType::from_i32)
    }

    fn main_clock_name(&self) -> String {
        let mut name = None;
        let code = unsafe {
            (self.access.get_main_clock_name)(self.access.handle, StringSink::single(&mut name))
        };
        remote_notify("get_main_clock_name", code);
        name.unwrap_or_default()
    }

    fn register_event_sink(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        let sink = expose_event_sink(Transfer::Weak(event_sink));
        remote_transfer(sink.destructor, |result| unsafe {
            (self.access.register_event_sink)(self.access.handle, result, sink)
        })
    }

    fn unregister_event_sink(&self, event_sink: &Weak<dyn EventSink>) -> Result<()> {
        let identity = exposed_event_sink(event_sink)
            .ok_or_else(|| ParticipantError::not_found("event sink is not registered"))?;
        remote_result(|result| unsafe {
            (self.access.unregister_event_sink)(self.access.handle, result, identity)
        })
    }

    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<()> {
        let access = expose_clock(Transfer::Shared(clock));
        remote_transfer(access.destructor, |result| unsafe {
            (self.access.register_clock)(self.access.handle, result, access)
        })
    }

    fn unregister_clock(&self, clock_name: &str) -> Result<()> {
        let (name_ptr, name_len) = str_parts(clock_name);
        remote_result(|result| unsafe {
            (self.access.unregister_clock)(self.access.handle, result, name_ptr, name_len)
        })
    }

    fn clock_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let code = unsafe {
            (self.access.get_clock_names)(self.access.handle, StringSink::recurring(&mut names))
        };
        remote_notify("get_clock_names", code);
        names
    }

    fn find_clock(&self, clock_name: &str) -> Option<Arc<dyn Clock>> {
        let (name_ptr, name_len) = str_parts(clock_name);
        let received = unsafe {
            receive_access::<ClockAccess>(|out| {
                (self.access.find_clock)(self.access.handle, name_ptr, name_len, out)
            })
        };
        match received {
            Ok(access) => access.map(|access| {
                Arc::new(unsafe { ClockProxy::from_access(access, self.binary.clone()) })
                    as Arc<dyn Clock>
            }),
            Err(code) => {
                remote_notify("find_clock", code);
                None
            }
        }
    }
}
