//! # Component Access
//!
//! A component created by a plugin factory is handed to the host by unique
//! transfer: the host's [`ComponentProxy`] is the only owner, and dropping
//! it destroys the component inside the plugin.
//!
//! ```text
//! host                                   plugin
//! ComponentProxy ──lifecycle calls──▶    InterfaceHandle (EXPOSED_COMPONENTS)
//!   └─ typed proxy ──get_interface──▶      └─ Arc<dyn I> (weak slot)
//! create(components) ──lend──▶           ComponentsProxy
//! ```

use crate::access::components::{lend_components, ComponentsAccess, ComponentsProxy};
use crate::access::{str_parts, AccessStruct};
use crate::callbacks::{read_str, ResultSink, StringSink};
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded, guarded_release, guarded_result, remote_result};
use crate::handle::{BorrowGuard, Handle, HandleArena, Transfer};
use crate::remote::binding_for;
use crate::transfer::SharedBinary;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use participant_types::{Component, Components, InterfaceHandle, ParticipantError, Result};
use std::ffi::c_void;
use std::sync::Arc;

lazy_static! {
    static ref EXPOSED_COMPONENTS: HandleArena<InterfaceHandle> = HandleArena::new();
}

type LifecycleFn = unsafe extern "C" fn(Handle, ResultSink) -> InterfaceError;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ComponentAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub get_iid: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
    pub get_interface:
        unsafe extern "C" fn(Handle, *const u8, usize, *mut c_void) -> InterfaceError,
    pub create: unsafe extern "C" fn(Handle, ResultSink, ComponentsAccess) -> InterfaceError,
    pub destroy: LifecycleFn,
    pub initialize: LifecycleFn,
    pub tense: LifecycleFn,
    pub start: LifecycleFn,
    pub stop: LifecycleFn,
    pub relax: LifecycleFn,
    pub deinitialize: LifecycleFn,
}

unsafe impl AccessStruct for ComponentAccess {}

pub fn expose_component(component: InterfaceHandle) -> ComponentAccess {
    let handle = EXPOSED_COMPONENTS.admit(Transfer::Unique(Box::new(component)));
    ComponentAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_component),
        get_iid: component_get_iid,
        get_interface: component_get_interface,
        create: component_create,
        destroy: component_destroy,
        initialize: component_initialize,
        tense: component_tense,
        start: component_start,
        stop: component_stop,
        relax: component_relax,
        deinitialize: component_deinitialize,
    }
}

/// Number of components this binary has handed out and not yet destroyed.
pub fn exposed_component_count() -> usize {
    EXPOSED_COMPONENTS.len()
}

unsafe extern "C" fn destroy_component(handle: Handle) {
    guarded_release(handle, || {
        EXPOSED_COMPONENTS.release(handle);
    });
}

unsafe extern "C" fn component_get_iid(handle: Handle, iid: StringSink) -> InterfaceError {
    guarded(&EXPOSED_COMPONENTS, handle, iid.is_valid(), |exposed| {
        iid.deliver(exposed.iid());
    })
}

unsafe extern "C" fn component_get_interface(
    handle: Handle,
    iid: *const u8,
    iid_len: usize,
    out: *mut c_void,
) -> InterfaceError {
    guarded(&EXPOSED_COMPONENTS, handle, !out.is_null(), |exposed| {
        let iid = read_str(iid, iid_len);
        if exposed.iid() != iid {
            return;
        }
        if let Some(binding) = binding_for(&iid) {
            binding.expose(&exposed, out);
        }
    })
}

unsafe extern "C" fn component_create(
    handle: Handle,
    result: ResultSink,
    components: ComponentsAccess,
) -> InterfaceError {
    guarded_result(&EXPOSED_COMPONENTS, handle, result, |exposed| {
        let components: Arc<dyn Components> =
            Arc::new(ComponentsProxy::from_access(components, None));
        exposed.component().create(components)
    })
}

macro_rules! lifecycle_wrapper {
    ($($wrapper:ident => $method:ident),+ $(,)?) => {
        $(
            unsafe extern "C" fn $wrapper(handle: Handle, result: ResultSink) -> InterfaceError {
                guarded_result(&EXPOSED_COMPONENTS, handle, result, |exposed| {
                    exposed.component().$method()
                })
            }
        )+
    };
}

lifecycle_wrapper! {
    component_destroy => destroy,
    component_initialize => initialize,
    component_tense => tense,
    component_start => start,
    component_stop => stop,
    component_relax => relax,
    component_deinitialize => deinitialize,
}

/// Host-side [`Component`] for a component living in a plugin.
pub struct ComponentProxy {
    access: ComponentAccess,
    iid: String,
    _destruction: DestructionManager,
    lookup: Mutex<Option<BorrowGuard<dyn Components>>>,
    _binary: Option<SharedBinary>,
}

impl ComponentProxy {
    fn lifecycle(&self, call: LifecycleFn) -> Result<()> {
        remote_result(|result| unsafe { call(self.access.handle, result) })
    }
}

impl Component for ComponentProxy {
    fn iid(&self) -> &str {
        &self.iid
    }

    fn create(&self, components: Arc<dyn Components>) -> Result<()> {
        let (access, guard) = lend_components(&components);
        *self.lookup.lock() = Some(guard);
        let outcome =
            remote_result(|result| unsafe { (self.access.create)(self.access.handle, result, access) });
        if outcome.is_err() {
            self.lookup.lock().take();
        }
        outcome
    }

    fn destroy(&self) -> Result<()> {
        let outcome = self.lifecycle(self.access.destroy);
        self.lookup.lock().take();
        outcome
    }

    fn initialize(&self) -> Result<()> {
        self.lifecycle(self.access.initialize)
    }

    fn tense(&self) -> Result<()> {
        self.lifecycle(self.access.tense)
    }

    fn start(&self) -> Result<()> {
        self.lifecycle(self.access.start)
    }

    fn stop(&self) -> Result<()> {
        self.lifecycle(self.access.stop)
    }

    fn relax(&self) -> Result<()> {
        self.lifecycle(self.access.relax)
    }

    fn deinitialize(&self) -> Result<()> {
        self.lifecycle(self.access.deinitialize)
    }
}

/// Take ownership of a component created by a plugin factory.
///
/// The result carries a typed interface when the component's IID has a
/// binding in this binary, and only its lifecycle otherwise.
///
/// # Safety
///
/// `access` must come from [`expose_component`] in the binary kept alive by
/// `binary`.
pub unsafe fn proxy_component(
    access: ComponentAccess,
    binary: Option<SharedBinary>,
) -> Result<InterfaceHandle> {
    let destruction = DestructionManager::with(access.destructor);

    let mut iid = None;
    remote_result(|_| (access.get_iid)(access.handle, StringSink::single(&mut iid)))?;
    let iid = iid.ok_or_else(|| ParticipantError::unexpected("component reported no iid"))?;

    let component: Arc<dyn Component> = Arc::new(ComponentProxy {
        access,
        iid: iid.clone(),
        _destruction: destruction,
        lookup: Mutex::new(None),
        _binary: binary.clone(),
    });

    let Some(binding) = binding_for(&iid) else {
        return Ok(InterfaceHandle::untyped(component));
    };
    let (iid_ptr, iid_len) = str_parts(&iid);
    let mut fill = |out: *mut c_void| (access.get_interface)(access.handle, iid_ptr, iid_len, out);
    let typed = binding
        .proxy(&mut fill, Some(Arc::clone(&component)), binary)
        .map_err(ParticipantError::from)?;
    Ok(typed.unwrap_or_else(|| InterfaceHandle::untyped(component)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use participant_types::{
        get_component, ComponentInterface, ConfigurationService, ErrorCode, PropertyValue,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reads its configuration through the lookup service it was created with.
    #[derive(Default)]
    struct Reader {
        components: Mutex<Option<Arc<dyn Components>>>,
        starts: AtomicUsize,
    }

    impl Component for Reader {
        fn iid(&self) -> &str {
            "reader.test.iid"
        }

        fn create(&self, components: Arc<dyn Components>) -> Result<()> {
            *self.components.lock() = Some(components);
            Ok(())
        }

        fn destroy(&self) -> Result<()> {
            self.components.lock().take();
            Ok(())
        }

        fn start(&self) -> Result<()> {
            let components = self
                .components
                .lock()
                .clone()
                .ok_or_else(|| ParticipantError::invalid_state("not created"))?;
            let configuration = get_component::<dyn ConfigurationService>(components.as_ref())
                .ok_or_else(|| ParticipantError::not_found("configuration service"))?;
            configuration.set_property("reader/started", PropertyValue::Bool(true))?;
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Flags(Mutex<Vec<(String, PropertyValue)>>);

    impl Component for Flags {
        fn iid(&self) -> &str {
            <dyn ConfigurationService as ComponentInterface>::IID
        }
    }

    impl ConfigurationService for Flags {
        fn set_property(&self, path: &str, value: PropertyValue) -> Result<()> {
            self.0.lock().push((path.to_string(), value));
            Ok(())
        }
        fn get_property(&self, path: &str) -> Option<PropertyValue> {
            self.0
                .lock()
                .iter()
                .rev()
                .find(|(p, _)| p == path)
                .map(|(_, v)| v.clone())
        }
        fn remove_property(&self, path: &str) -> Result<()> {
            Err(ParticipantError::not_found(path))
        }
        fn property_names(&self) -> Vec<String> {
            self.0.lock().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    struct HostComponents(InterfaceHandle);

    impl Components for HostComponents {
        fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
            (self.0.iid() == iid).then(|| self.0.clone())
        }
    }

    #[test]
    fn test_untyped_component_lifecycle() {
        let reader = Arc::new(Reader::default());
        let access = expose_component(InterfaceHandle::untyped(reader.clone()));
        let handle = unsafe { proxy_component(access, None) }.expect("proxy");
        assert_eq!(handle.iid(), "reader.test.iid");
        let component = handle.component();

        let err = component.start().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);

        let flags: Arc<dyn ConfigurationService> = Arc::new(Flags::default());
        let host: Arc<dyn Components> =
            Arc::new(HostComponents(InterfaceHandle::new(Arc::clone(&flags))));
        component.create(Arc::clone(&host)).expect("create");
        component.start().expect("start");
        assert_eq!(
            flags.get_property("reader/started"),
            Some(PropertyValue::Bool(true))
        );
        component.destroy().expect("destroy");

        drop(component);
        drop(handle);
        assert_eq!(Arc::strong_count(&reader), 1);
        assert_eq!(reader.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_typed_component_gets_interface_proxy() {
        let flags: Arc<dyn ConfigurationService> = Arc::new(Flags::default());
        let access = expose_component(InterfaceHandle::new(Arc::clone(&flags)));
        let handle = unsafe { proxy_component(access, None) }.expect("proxy");

        let typed = handle
            .downcast::<dyn ConfigurationService>()
            .expect("typed proxy");
        typed.set_property("a", PropertyValue::Int(1)).expect("set");
        assert_eq!(flags.property_names(), vec!["a".to_string()]);
        assert_eq!(
            handle.component().iid(),
            <dyn ConfigurationService as ComponentInterface>::IID
        );

        drop(typed);
        drop(handle);
        assert_eq!(Arc::strong_count(&flags), 1);
    }
}
