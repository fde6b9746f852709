//! Components lookup access. The lookup service is lent to a plugin for
//! the time between `create` and `destroy` of the component that received
//! it; interfaces found through it are borrowed.

use crate::access::{str_parts, AccessStruct};
use crate::callbacks::read_str;
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded, remote_notify};
use crate::handle::{BorrowGuard, Handle, HandleArena};
use crate::remote::binding_for;
use crate::transfer::SharedBinary;
use lazy_static::lazy_static;
use participant_types::{Components, InterfaceHandle};
use std::ffi::c_void;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref COMPONENTS: HandleArena<dyn Components> = HandleArena::new();
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ComponentsAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    /// Writes the access structure of the interface's binding to `out`, or
    /// leaves a null handle if no component of that IID can cross.
    pub find_component:
        unsafe extern "C" fn(Handle, *const u8, usize, *mut c_void) -> InterfaceError,
}

unsafe impl AccessStruct for ComponentsAccess {}

/// Lend `components` to another binary until the guard is dropped.
pub fn lend_components(
    components: &Arc<dyn Components>,
) -> (ComponentsAccess, BorrowGuard<dyn Components>) {
    let guard = COMPONENTS.lend(components);
    let access = ComponentsAccess {
        handle: guard.handle(),
        destructor: DestructorAccess::BORROWED,
        find_component: components_find_component,
    };
    (access, guard)
}

unsafe extern "C" fn components_find_component(
    handle: Handle,
    iid: *const u8,
    iid_len: usize,
    out: *mut c_void,
) -> InterfaceError {
    guarded(&COMPONENTS, handle, !out.is_null(), |components| {
        let iid = read_str(iid, iid_len);
        let Some(binding) = binding_for(&iid) else {
            debug!(%iid, "[Plugin] interface cannot cross the boundary");
            return;
        };
        if let Some(found) = components.find_component(&iid) {
            binding.expose(&found, out);
        }
    })
}

/// Local [`Components`] forwarding lookups to another binary.
pub struct ComponentsProxy {
    access: ComponentsAccess,
    _destruction: DestructionManager,
    binary: Option<SharedBinary>,
}

impl ComponentsProxy {
    /// # Safety
    ///
    /// `access` must come from [`lend_components`] whose guard is still alive.
    pub unsafe fn from_access(access: ComponentsAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            binary,
        }
    }
}

impl Components for ComponentsProxy {
    fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
        let binding = binding_for(iid)?;
        let (iid_ptr, iid_len) = str_parts(iid);
        let mut fill = |out: *mut c_void| unsafe {
            (self.access.find_component)(self.access.handle, iid_ptr, iid_len, out)
        };
        match unsafe { binding.proxy(&mut fill, None, self.binary.clone()) } {
            Ok(found) => found,
            Err(code) => {
                remote_notify("find_component", code);
                None
            }
        }
    }
}
