//! # Result Callbacks
//!
//! Strings and sequences never cross the boundary by value. The caller
//! passes a sink (destination pointer plus callback) and the callee invokes
//! the callback once per value, while the data is still borrowed:
//!
//! ```text
//! get_name(handle, StringSink::single(&mut name))       → callback × 1
//! get_clock_names(handle, StringSink::recurring(&mut v)) → callback × n, in order
//! start(handle, ResultSink::new(&mut outcome))          → callback × 1 on failure
//! ```
//!
//! Strings travel as UTF-8 pointer plus length.

use participant_types::{ErrorCode, ParticipantError};
use std::ffi::c_void;
use std::slice;

pub type StringCallback = unsafe extern "C" fn(destination: *mut c_void, data: *const u8, len: usize);

pub type ResultCallback =
    unsafe extern "C" fn(destination: *mut c_void, code: i32, data: *const u8, len: usize);

/// Receiver of one or more strings.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringSink {
    pub destination: *mut c_void,
    pub callback: Option<StringCallback>,
}

impl StringSink {
    /// Sink storing a single value. A later value replaces an earlier one.
    pub fn single(target: &mut Option<String>) -> Self {
        Self {
            destination: (target as *mut Option<String>).cast(),
            callback: Some(store_single),
        }
    }

    /// Sink appending every delivered value.
    pub fn recurring(target: &mut Vec<String>) -> Self {
        Self {
            destination: (target as *mut Vec<String>).cast(),
            callback: Some(store_recurring),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.destination.is_null() && self.callback.is_some()
    }

    /// # Safety
    ///
    /// The sink must have been created from a target that is still alive.
    pub unsafe fn deliver(&self, value: &str) {
        if let Some(callback) = self.callback {
            callback(self.destination, value.as_ptr(), value.len());
        }
    }
}

/// Receiver of a domain result. Only invoked on failure.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ResultSink {
    pub destination: *mut c_void,
    pub callback: Option<ResultCallback>,
}

impl ResultSink {
    pub fn new(target: &mut Option<ParticipantError>) -> Self {
        Self {
            destination: (target as *mut Option<ParticipantError>).cast(),
            callback: Some(store_error),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.destination.is_null() && self.callback.is_some()
    }

    /// # Safety
    ///
    /// The sink must have been created from a target that is still alive.
    pub unsafe fn deliver(&self, outcome: participant_types::Result<()>) {
        if let (Err(error), Some(callback)) = (outcome, self.callback) {
            callback(
                self.destination,
                error.code.as_i32(),
                error.description.as_ptr(),
                error.description.len(),
            );
        }
    }
}

/// Copy a borrowed UTF-8 buffer. Invalid sequences are replaced.
///
/// # Safety
///
/// `data` must point to `len` readable bytes, or be null with `len == 0`.
pub unsafe fn read_str(data: *const u8, len: usize) -> String {
    if data.is_null() || len == 0 {
        return String::new();
    }
    String::from_utf8_lossy(slice::from_raw_parts(data, len)).into_owned()
}

unsafe extern "C" fn store_single(destination: *mut c_void, data: *const u8, len: usize) {
    let target = &mut *destination.cast::<Option<String>>();
    *target = Some(read_str(data, len));
}

unsafe extern "C" fn store_recurring(destination: *mut c_void, data: *const u8, len: usize) {
    let target = &mut *destination.cast::<Vec<String>>();
    target.push(read_str(data, len));
}

unsafe extern "C" fn store_error(destination: *mut c_void, code: i32, data: *const u8, len: usize) {
    let target = &mut *destination.cast::<Option<ParticipantError>>();
    *target = Some(ParticipantError::new(
        ErrorCode::from_i32(code),
        read_str(data, len),
    ));
}
