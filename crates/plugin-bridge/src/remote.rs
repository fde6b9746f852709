//! # Remote Interfaces
//!
//! Component interfaces that can be looked up across the boundary implement
//! [`RemoteInterface`]. The binding table maps an IID to the two halves of
//! the bridge for that interface:
//!
//! ```text
//! owning side:    InterfaceHandle ──expose──▶ Access struct (weak slot)
//! receiving side: Access struct ──proxy──▶ InterfaceHandle (typed proxy)
//! ```
//!
//! Looked-up interfaces are borrowed: the receiver never extends the
//! lifetime of the component, and calls fail cleanly once it is gone.

use crate::access::clock_service::ClockServiceAccess;
use crate::access::configuration::ConfigurationServiceAccess;
use crate::access::job_registry::JobRegistryAccess;
use crate::access::{receive_access, write_access, AccessStruct};
use crate::error::InterfaceError;
use crate::transfer::SharedBinary;
use participant_types::{
    ClockService, Component, ComponentInterface, ConfigurationService, InterfaceHandle,
    JobRegistry,
};
use std::ffi::c_void;
use std::sync::{Arc, Weak};

/// A component interface with an access structure.
pub trait RemoteInterface: ComponentInterface {
    type Access: AccessStruct;

    /// Expose a borrowed reference to `interface`.
    fn expose(interface: Weak<Self>) -> Self::Access;

    /// Build the local proxy for a received access structure.
    ///
    /// # Safety
    ///
    /// `access` must come from [`RemoteInterface::expose`] in a live binary.
    unsafe fn proxy(access: Self::Access, binary: Option<SharedBinary>) -> Arc<Self>;
}

impl RemoteInterface for dyn ConfigurationService {
    type Access = ConfigurationServiceAccess;

    fn expose(interface: Weak<Self>) -> Self::Access {
        crate::access::configuration::expose_configuration_service(interface)
    }

    unsafe fn proxy(access: Self::Access, binary: Option<SharedBinary>) -> Arc<Self> {
        Arc::new(crate::access::configuration::ConfigurationServiceProxy::from_access(
            access, binary,
        ))
    }
}

impl RemoteInterface for dyn ClockService {
    type Access = ClockServiceAccess;

    fn expose(interface: Weak<Self>) -> Self::Access {
        crate::access::clock_service::expose_clock_service(interface)
    }

    unsafe fn proxy(access: Self::Access, binary: Option<SharedBinary>) -> Arc<Self> {
        Arc::new(crate::access::clock_service::ClockServiceProxy::from_access(
            access, binary,
        ))
    }
}

impl RemoteInterface for dyn JobRegistry {
    type Access = JobRegistryAccess;

    fn expose(interface: Weak<Self>) -> Self::Access {
        crate::access::job_registry::expose_job_registry(interface)
    }

    unsafe fn proxy(access: Self::Access, binary: Option<SharedBinary>) -> Arc<Self> {
        Arc::new(crate::access::job_registry::JobRegistryProxy::from_access(
            access, binary,
        ))
    }
}

type ExposeFn = fn(&InterfaceHandle, *mut c_void) -> bool;

type ProxyFn = unsafe fn(
    &mut dyn FnMut(*mut c_void) -> InterfaceError,
    Option<Arc<dyn Component>>,
    Option<SharedBinary>,
) -> Result<Option<InterfaceHandle>, InterfaceError>;

/// Both halves of the bridge for one IID.
#[derive(Clone, Copy)]
pub struct InterfaceBinding {
    pub iid: &'static str,
    expose: ExposeFn,
    proxy: ProxyFn,
}

impl InterfaceBinding {
    fn of<I: ?Sized + RemoteInterface>() -> Self {
        Self {
            iid: I::IID,
            expose: expose_with::<I>,
            proxy: proxy_with::<I>,
        }
    }

    /// Write the access structure of `handle` to `out`. Returns `false` if
    /// the handle does not carry this interface.
    ///
    /// # Safety
    ///
    /// `out` must be non-null and point to storage for this binding's access
    /// structure.
    pub unsafe fn expose(&self, handle: &InterfaceHandle, out: *mut c_void) -> bool {
        (self.expose)(handle, out)
    }

    /// Fetch the access structure through `fill` and wrap it in a proxy.
    ///
    /// With `component`, the returned handle drives that component's
    /// lifecycle; without, the proxy is a plain lookup result.
    ///
    /// # Safety
    ///
    /// `fill` must write this binding's access structure or leave it untouched.
    pub unsafe fn proxy(
        &self,
        fill: &mut dyn FnMut(*mut c_void) -> InterfaceError,
        component: Option<Arc<dyn Component>>,
        binary: Option<SharedBinary>,
    ) -> Result<Option<InterfaceHandle>, InterfaceError> {
        (self.proxy)(fill, component, binary)
    }
}

fn expose_with<I: ?Sized + RemoteInterface>(handle: &InterfaceHandle, out: *mut c_void) -> bool {
    let Some(interface) = handle.downcast::<I>() else {
        return false;
    };
    // SAFETY: callers of `InterfaceBinding::expose` guarantee `out`.
    unsafe { write_access(out, I::expose(Arc::downgrade(&interface))) };
    true
}

unsafe fn proxy_with<I: ?Sized + RemoteInterface>(
    fill: &mut dyn FnMut(*mut c_void) -> InterfaceError,
    component: Option<Arc<dyn Component>>,
    binary: Option<SharedBinary>,
) -> Result<Option<InterfaceHandle>, InterfaceError> {
    let Some(access) = receive_access::<I::Access>(fill)? else {
        return Ok(None);
    };
    let proxy = I::proxy(access, binary);
    Ok(Some(match component {
        Some(component) => InterfaceHandle::with_component(proxy, component),
        None => InterfaceHandle::new(proxy),
    }))
}

/// Every interface that can be looked up across the boundary.
#[must_use]
pub fn bindings() -> [InterfaceBinding; 3] {
    [
        InterfaceBinding::of::<dyn ConfigurationService>(),
        InterfaceBinding::of::<dyn ClockService>(),
        InterfaceBinding::of::<dyn JobRegistry>(),
    ]
}

/// Binding for `iid`, if the interface can cross the boundary.
#[must_use]
pub fn binding_for(iid: &str) -> Option<InterfaceBinding> {
    bindings().into_iter().find(|binding| binding.iid == iid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use participant_types::ComponentInterface;

    #[test]
    fn test_binding_table_covers_component_interfaces() {
        for iid in [
            <dyn ConfigurationService as ComponentInterface>::IID,
            <dyn ClockService as ComponentInterface>::IID,
            <dyn JobRegistry as ComponentInterface>::IID,
        ] {
            assert!(binding_for(iid).is_some(), "{}", iid);
        }
        assert!(binding_for("scheduler_service.arya.participant.iid").is_none());
    }
}
