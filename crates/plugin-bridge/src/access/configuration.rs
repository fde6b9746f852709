//! Configuration service access. Property values cross as a type tag plus
//! their canonical string form, so every value reads back exactly.

use crate::access::{str_parts, AccessStruct};
use crate::callbacks::{read_str, ResultSink, StringSink};
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded, guarded_release, guarded_result, remote_notify, remote_result};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::SharedBinary;
use lazy_static::lazy_static;
use participant_types::{
    Component, ComponentInterface, ConfigurationService, ParticipantError, PropertyType,
    PropertyValue, Result,
};
use std::sync::Weak;
use tracing::warn;

lazy_static! {
    static ref CONFIGURATION_SERVICES: HandleArena<dyn ConfigurationService> = HandleArena::new();
}

/// Type tag written by `get_property` when the path is unset.
const NO_PROPERTY: i32 = -1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConfigurationServiceAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub set_property: unsafe extern "C" fn(
        Handle,
        ResultSink,
        *const u8,
        usize,
        i32,
        *const u8,
        usize,
    ) -> InterfaceError,
    pub get_property:
        unsafe extern "C" fn(Handle, *const u8, usize, *mut i32, StringSink) -> InterfaceError,
    pub remove_property: unsafe extern "C" fn(Handle, ResultSink, *const u8, usize) -> InterfaceError,
    pub get_property_names: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
}

unsafe impl AccessStruct for ConfigurationServiceAccess {}

pub fn expose_configuration_service(
    service: Weak<dyn ConfigurationService>,
) -> ConfigurationServiceAccess {
    let handle = CONFIGURATION_SERVICES.admit(Transfer::Weak(service));
    ConfigurationServiceAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_configuration_service),
        set_property: configuration_set_property,
        get_property: configuration_get_property,
        remove_property: configuration_remove_property,
        get_property_names: configuration_get_property_names,
    }
}

unsafe extern "C" fn destroy_configuration_service(handle: Handle) {
    guarded_release(handle, || {
        CONFIGURATION_SERVICES.release(handle);
    });
}

unsafe extern "C" fn configuration_set_property(
    handle: Handle,
    result: ResultSink,
    path: *const u8,
    path_len: usize,
    property_type: i32,
    value: *const u8,
    value_len: usize,
) -> InterfaceError {
    guarded_result(&CONFIGURATION_SERVICES, handle, result, |service| {
        let path = read_str(path, path_len);
        let property_type = PropertyType::from_i32(property_type).ok_or_else(|| {
            ParticipantError::invalid_argument(format!("unknown property type tag {}", property_type))
        })?;
        let value = PropertyValue::parse(property_type, &read_str(value, value_len))?;
        service.set_property(&path, value)
    })
}

unsafe extern "C" fn configuration_get_property(
    handle: Handle,
    path: *const u8,
    path_len: usize,
    property_type: *mut i32,
    value: StringSink,
) -> InterfaceError {
    let outputs_valid = !property_type.is_null() && value.is_valid();
    guarded(&CONFIGURATION_SERVICES, handle, outputs_valid, |service| {
        match service.get_property(&read_str(path, path_len)) {
            Some(found) => {
                value.deliver(&found.to_canonical_string());
                *property_type = found.property_type() as i32;
            }
            None => *property_type = NO_PROPERTY,
        }
    })
}

unsafe extern "C" fn configuration_remove_property(
    handle: Handle,
    result: ResultSink,
    path: *const u8,
    path_len: usize,
) -> InterfaceError {
    guarded_result(&CONFIGURATION_SERVICES, handle, result, |service| {
        service.remove_property(&read_str(path, path_len))
    })
}

unsafe extern "C" fn configuration_get_property_names(
    handle: Handle,
    names: StringSink,
) -> InterfaceError {
    guarded(&CONFIGURATION_SERVICES, handle, names.is_valid(), |service| {
        for name in service.property_names() {
            names.deliver(&name);
        }
    })
}

/// Local [`ConfigurationService`] forwarding to another binary.
pub struct ConfigurationServiceProxy {
    access: ConfigurationServiceAccess,
    _destruction: DestructionManager,
    _binary: Option<SharedBinary>,
}

impl ConfigurationServiceProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_configuration_service`] in a live binary.
    pub unsafe fn from_access(
        access: ConfigurationServiceAccess,
        binary: Option<SharedBinary>,
    ) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            _binary: binary,
        }
    }
}

impl Component for ConfigurationServiceProxy {
    fn iid(&self) -> &str {
        <dyn ConfigurationService as ComponentInterface>::IID
    }
}

impl ConfigurationService for ConfigurationServiceProxy {
    fn set_property(&self, path: &str, value: PropertyValue) -> Result<()> {
        let (path_ptr, path_len) = str_parts(path);
        let text = value.to_canonical_string();
        let (value_ptr, value_len) = str_parts(&text);
        remote_result(|result| unsafe {
            (self.access.set_property)(
                self.access.handle,
                result,
                path_ptr,
                path_len,
                value.property_type() as i32,
                value_ptr,
                value_len,
            )
        })
    }

    fn get_property(&self, path: &str) -> Option<PropertyValue> {
        let (path_ptr, path_len) = str_parts(path);
        let mut tag = NO_PROPERTY;
        let mut text = None;
        let code = unsafe {
            (self.access.get_property)(
                self.access.handle,
                path_ptr,
                path_len,
                &mut tag,
                StringSink::single(&mut text),
            )
        };
        remote_notify("get_property", code);
        let property_type = PropertyType::from_i32(tag)?;
        match PropertyValue::parse(property_type, text.as_deref().unwrap_or_default()) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(path, %error, "[Plugin] unreadable property value");
                None
            }
        }
    }

    fn remove_property(&self, path: &str) -> Result<()> {
        let (path_ptr, path_len) = str_parts(path);
        remote_result(|result| unsafe {
            (self.access.remove_property)(self.access.handle, result, path_ptr, path_len)
        })
    }

    fn property_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let code = unsafe {
            (self.access.get_property_names)(self.access.handle, StringSink::recurring(&mut names))
        };
        remote_notify("get_property_names", code);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct MapConfiguration(Mutex<BTreeMap<String, PropertyValue>>);

    impl Component for MapConfiguration {
        fn iid(&self) -> &str {
            <dyn ConfigurationService as ComponentInterface>::IID
        }
    }

    impl ConfigurationService for MapConfiguration {
        fn set_property(&self, path: &str, value: PropertyValue) -> Result<()> {
            self.0.lock().insert(path.to_string(), value);
            Ok(())
        }

        fn get_property(&self, path: &str) -> Option<PropertyValue> {
            self.0.lock().get(path).cloned()
        }

        fn remove_property(&self, path: &str) -> Result<()> {
            self.0
                .lock()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| ParticipantError::not_found(path))
        }

        fn property_names(&self) -> Vec<String> {
            self.0.lock().keys().cloned().collect()
        }
    }

    fn proxied() -> (Arc<dyn ConfigurationService>, ConfigurationServiceProxy) {
        let local: Arc<dyn ConfigurationService> = Arc::new(MapConfiguration::default());
        let access = expose_configuration_service(Arc::downgrade(&local));
        let proxy = unsafe { ConfigurationServiceProxy::from_access(access, None) };
        (local, proxy)
    }

    fn any_value() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            ".*".prop_map(PropertyValue::String),
            any::<bool>().prop_map(PropertyValue::Bool),
            any::<i64>().prop_map(PropertyValue::Int),
            any::<f64>()
                .prop_filter("NaN never compares equal", |v| !v.is_nan())
                .prop_map(PropertyValue::Double),
        ]
    }

    proptest! {
        #[test]
        fn test_values_cross_exactly(value in any_value()) {
            let (local, proxy) = proxied();
            proxy.set_property("clock/value", value.clone()).expect("set");
            prop_assert_eq!(local.get_property("clock/value"), Some(value.clone()));
            prop_assert_eq!(proxy.get_property("clock/value"), Some(value));
        }
    }

    #[test]
    fn test_missing_property_and_errors() {
        let (local, proxy) = proxied();
        assert_eq!(proxy.get_property("nope"), None);

        let err = proxy.remove_property("nope").unwrap_err();
        assert_eq!(err.code, participant_types::ErrorCode::NotFound);

        proxy.set_property("b", PropertyValue::Int(1)).expect("set");
        proxy.set_property("a", PropertyValue::Bool(false)).expect("set");
        assert_eq!(proxy.property_names(), vec!["a".to_string(), "b".to_string()]);

        drop(local);
        assert_eq!(proxy.get_property("a"), None);
        assert!(proxy.set_property("a", PropertyValue::Int(2)).is_err());
    }
}
