//! # Configuration Service Interface
//!
//! A flat property tree keyed by `/`-separated paths. Components read their
//! settings (main clock, step size, scheduler) from here.

use crate::component::{Component, ComponentInterface};
use crate::errors::{ParticipantError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Well-known property paths.
pub mod paths {
    /// Name of the clock the clock service uses as main clock.
    pub const MAIN_CLOCK: &str = "clock/main_clock";
    /// Step size of the native discrete clock, in nanoseconds.
    pub const STEP_SIZE: &str = "clock/step_size";
    /// Pacing of the discrete clock (`0.0` = as fast as possible).
    pub const TIME_FACTOR: &str = "clock/time_factor";
    /// Sample period of the native continuous clock, in nanoseconds.
    pub const SAMPLE_PERIOD: &str = "clock/sample_period";
    /// `timer` or `external`: who drives the discrete clock's steps.
    pub const DISCRETE_DRIVE: &str = "clock/discrete_drive";
    /// Name of the active scheduler.
    pub const SCHEDULER: &str = "scheduling/scheduler";
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
}

/// Type tag used when a value crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PropertyType {
    String = 0,
    Bool = 1,
    Int = 2,
    Double = 3,
}

impl PropertyType {
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::String),
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Double),
            _ => None,
        }
    }
}

impl PropertyValue {
    #[must_use]
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Bool(_) => PropertyType::Bool,
            Self::Int(_) => PropertyType::Int,
            Self::Double(_) => PropertyType::Double,
        }
    }

    /// Canonical string form. Doubles use the shortest representation
    /// that parses back to the same bits.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Double(value) => format!("{:?}", value),
        }
    }

    /// Inverse of [`PropertyValue::to_canonical_string`].
    pub fn parse(property_type: PropertyType, text: &str) -> Result<Self> {
        let invalid = |what: &str| {
            ParticipantError::invalid_argument(format!("'{}' is not a valid {}", text, what))
        };
        Ok(match property_type {
            PropertyType::String => Self::String(text.to_string()),
            PropertyType::Bool => Self::Bool(text.parse().map_err(|_| invalid("bool"))?),
            PropertyType::Int => Self::Int(text.parse().map_err(|_| invalid("int"))?),
            PropertyType::Double => Self::Double(text.parse().map_err(|_| invalid("double"))?),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// Property tree component.
pub trait ConfigurationService: Component {
    /// Set (or overwrite) the property at `path`.
    fn set_property(&self, path: &str, value: PropertyValue) -> Result<()>;

    /// Value at `path`, or `None` if unset.
    fn get_property(&self, path: &str) -> Option<PropertyValue>;

    /// Remove the property at `path`. Fails with `not_found` if unset.
    fn remove_property(&self, path: &str) -> Result<()>;

    /// All property paths, sorted.
    fn property_names(&self) -> Vec<String>;
}

impl ComponentInterface for dyn ConfigurationService {
    const IID: &'static str = "configuration_service.arya.participant.iid";
}

/// Read a string property with a default.
pub fn property_string(config: &dyn ConfigurationService, path: &str, default: &str) -> String {
    config
        .get_property(path)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| default.to_string())
}

/// Read a nanosecond property as a duration, rejecting non-positive values.
pub fn property_duration(
    config: &dyn ConfigurationService,
    path: &str,
    default: Duration,
) -> Result<Duration> {
    match config.get_property(path) {
        None => Ok(default),
        Some(PropertyValue::Int(nanos)) if nanos > 0 => Ok(Duration::from_nanos(nanos as u64)),
        Some(other) => Err(ParticipantError::invalid_argument(format!(
            "property '{}' must be a positive nanosecond count, got '{}'",
            path, other
        ))),
    }
}

/// Read a floating point property with a default.
pub fn property_double(config: &dyn ConfigurationService, path: &str, default: f64) -> f64 {
    config
        .get_property(path)
        .and_then(|value| value.as_double())
        .unwrap_or(default)
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// In-memory [`ConfigurationService`] component.
#[derive(Debug, Default)]
pub struct PropertyTree {
    properties: RwLock<BTreeMap<String, PropertyValue>>,
}

impl PropertyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree pre-filled with `(path, value)` pairs.
    pub fn with_properties<I, P>(properties: I) -> Self
    where
        I: IntoIterator<Item = (P, PropertyValue)>,
        P: Into<String>,
    {
        let tree = Self::default();
        {
            let mut map = tree.properties.write();
            for (path, value) in properties {
                map.insert(normalize(&path.into()), value);
            }
        }
        tree
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

impl Component for PropertyTree {
    fn iid(&self) -> &str {
        <dyn ConfigurationService as ComponentInterface>::IID
    }
}

impl ConfigurationService for PropertyTree {
    fn set_property(&self, path: &str, value: PropertyValue) -> Result<()> {
        let path = normalize(path);
        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(ParticipantError::invalid_argument(format!(
                "invalid property path '{}'",
                path
            )));
        }
        self.properties.write().insert(path, value);
        Ok(())
    }

    fn get_property(&self, path: &str) -> Option<PropertyValue> {
        self.properties.read().get(&normalize(path)).cloned()
    }

    fn remove_property(&self, path: &str) -> Result<()> {
        self.properties
            .write()
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| ParticipantError::not_found(format!("property '{}'", path)))
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }
}
