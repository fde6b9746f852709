//! # Access Structures
//!
//! One `#[repr(C)]` struct per exposed interface: a [`Handle`], the
//! destructor the receiver must run, then one function pointer per method.
//! Each module pairs the struct with
//!
//! - `expose_*`: the owning side's constructor, backed by a [`HandleArena`],
//! - `*Proxy`: the receiving side's implementation of the local trait.
//!
//! Field order is part of the [`crate::AbiVersion`]; changing it needs a new
//! version namespace.
//!
//! [`HandleArena`]: crate::HandleArena

pub mod clock;
pub mod clock_service;
pub mod component;
pub mod components;
pub mod configuration;
pub mod event_sink;
pub mod job;
pub mod job_registry;

use crate::error::InterfaceError;
use crate::handle::Handle;
use std::ffi::c_void;
use std::mem::MaybeUninit;

/// Marker for access structures.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`Handle`] as their first field.
pub unsafe trait AccessStruct: Copy + Send + Sync + 'static {}

/// Receive an access structure the far side may or may not provide.
///
/// The handle field is nulled before `fill` runs. A null handle afterwards
/// is the neutral "not capable" answer.
///
/// # Safety
///
/// `fill` must either leave the output untouched or write a complete `A`.
pub unsafe fn receive_access<A: AccessStruct>(
    fill: impl FnOnce(*mut c_void) -> InterfaceError,
) -> Result<Option<A>, InterfaceError> {
    let mut slot = MaybeUninit::<A>::uninit();
    let out = slot.as_mut_ptr();
    out.cast::<Handle>().write(Handle::NULL);
    fill(out.cast()).into_result()?;
    if out.cast::<Handle>().read().is_null() {
        return Ok(None);
    }
    Ok(Some(slot.assume_init()))
}

/// Write a complete access structure to an output pointer.
///
/// # Safety
///
/// `out` must be non-null and point to storage for an `A`.
pub unsafe fn write_access<A: AccessStruct>(out: *mut c_void, access: A) {
    out.cast::<A>().write(access);
}

/// Borrowed UTF-8 view used for string arguments.
pub(crate) fn str_parts(value: &str) -> (*const u8, usize) {
    (value.as_ptr(), value.len())
}
