//! # Plugin Entry Points
//!
//! A plugin is a `cdylib` exporting four C symbols:
//!
//! | Symbol | Signature |
//! |--------|-----------|
//! | `participant_plugin_get_version` | `() -> *const c_char` |
//! | `participant_plugin_get_participant_library_version` | `() -> ParticipantLibraryVersion` |
//! | `participant_plugin_is_debug_build` | `() -> bool`, debug builds only |
//! | `participant_plugin_arya_create_component` | `(*mut c_void, *const c_char) -> InterfaceError` |
//!
//! [`export_participant_plugin!`](crate::export_participant_plugin) generates all of them
//! from a version string and a factory function.

use crate::access::component::{expose_component, proxy_component, ComponentAccess};
use crate::access::{receive_access, write_access};
use crate::error::InterfaceError;
use crate::transfer::SharedBinary;
use crate::version::ParticipantLibraryVersion;
use participant_types::{InterfaceHandle, ParticipantError, Result};
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

pub type GetVersionFn = unsafe extern "C" fn() -> *const c_char;
pub type GetLibraryVersionFn = unsafe extern "C" fn() -> ParticipantLibraryVersion;
pub type IsDebugBuildFn = unsafe extern "C" fn() -> bool;
pub type CreateComponentFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> InterfaceError;

/// Factory a plugin provides: the component for an IID, or `None` if the
/// plugin does not offer one.
pub type ComponentFactory = fn(&str) -> Option<InterfaceHandle>;

/// Plugin side of `create_component`.
///
/// Leaves a null handle in `out` when `factory` declines the IID.
///
/// # Safety
///
/// `out` must point to storage for a [`ComponentAccess`] and `iid` to a
/// NUL-terminated string, or be null.
pub unsafe fn create_component(
    out: *mut c_void,
    iid: *const c_char,
    factory: ComponentFactory,
) -> InterfaceError {
    if out.is_null() || iid.is_null() {
        return InterfaceError::InvalidResultPointer;
    }
    let iid = CStr::from_ptr(iid).to_string_lossy().into_owned();
    match panic::catch_unwind(AssertUnwindSafe(|| factory(&iid))) {
        Ok(Some(component)) => {
            write_access(out, expose_component(component));
            InterfaceError::None
        }
        Ok(None) => InterfaceError::None,
        Err(_) => {
            error!(%iid, "[Plugin] component factory panicked");
            InterfaceError::ExceptionCaught
        }
    }
}

/// Host side of `create_component`: ask a loaded plugin for a component.
///
/// # Safety
///
/// `create` must be the factory symbol of the binary kept alive by `binary`.
pub unsafe fn request_component(
    create: CreateComponentFn,
    iid: &str,
    binary: SharedBinary,
) -> Result<Option<InterfaceHandle>> {
    let iid_c = CString::new(iid)
        .map_err(|_| ParticipantError::invalid_argument(format!("iid '{}' contains NUL", iid)))?;
    let access = receive_access::<ComponentAccess>(|out| create(out, iid_c.as_ptr()))
        .map_err(ParticipantError::from)?;
    match access {
        Some(access) => proxy_component(access, Some(binary)).map(Some),
        None => Ok(None),
    }
}

/// Export the plugin entry points.
///
/// ```rust,ignore
/// fn create(iid: &str) -> Option<InterfaceHandle> { ... }
///
/// plugin_bridge::export_participant_plugin! {
///     version: "1.2.0",
///     factory: create,
/// }
/// ```
#[macro_export]
macro_rules! export_participant_plugin {
    (version: $version:literal, factory: $factory:path $(,)?) => {
        #[no_mangle]
        pub extern "C" fn participant_plugin_get_version() -> *const ::std::ffi::c_char {
            concat!($version, "\0").as_ptr().cast()
        }

        #[no_mangle]
        pub extern "C" fn participant_plugin_get_participant_library_version(
        ) -> $crate::ParticipantLibraryVersion {
            $crate::ParticipantLibraryVersion::current()
        }

        #[cfg(debug_assertions)]
        #[no_mangle]
        pub extern "C" fn participant_plugin_is_debug_build() -> bool {
            true
        }

        /// # Safety
        ///
        /// Called by the host loader with valid output storage.
        #[no_mangle]
        pub unsafe extern "C" fn participant_plugin_arya_create_component(
            out: *mut ::std::ffi::c_void,
            iid: *const ::std::ffi::c_char,
        ) -> $crate::InterfaceError {
            $crate::plugin::create_component(out, iid, $factory)
        }
    };
}
