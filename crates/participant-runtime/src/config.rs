//! # Participant Configuration
//!
//! Runtime settings of one participant, read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PARTICIPANT_NAME` | `participant` |
//! | `PARTICIPANT_COMPONENTS_FILE` | none |
//! | `PARTICIPANT_TIMING_FILE` | none |
//! | `PARTICIPANT_MAIN_CLOCK` | `local_system_realtime` |
//! | `PARTICIPANT_STEP_SIZE_MS` | `100` |
//! | `PARTICIPANT_RUN_SECONDS` | run until Ctrl+C |

use participant_types::{paths, PropertyValue, LOCAL_SYSTEM_REALTIME};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{variable}: expected {expected}, got '{value}'")]
    InvalidValue {
        variable: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Complete participant configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantConfig {
    /// Name used for telemetry and to select jobs from a timing file.
    pub name: String,
    /// Extra components to load after the native ones.
    pub components_file: Option<PathBuf>,
    /// Timing file applied after loading.
    pub timing_file: Option<PathBuf>,
    pub main_clock: String,
    /// Step size of the discrete native clock.
    pub step_size: Duration,
    /// `None` runs until interrupted.
    pub run_for: Option<Duration>,
    /// Additional properties for the configuration service.
    pub properties: Vec<(String, PropertyValue)>,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            name: "participant".to_string(),
            components_file: None,
            timing_file: None,
            main_clock: LOCAL_SYSTEM_REALTIME.to_string(),
            step_size: Duration::from_millis(100),
            run_for: None,
            properties: Vec::new(),
        }
    }
}

impl ParticipantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| env::var(variable).ok())
    }

    /// Build from any variable source. Unset or empty variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |variable: &str| lookup(variable).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(name) = get("PARTICIPANT_NAME") {
            config.name = name;
        }
        config.components_file = get("PARTICIPANT_COMPONENTS_FILE").map(PathBuf::from);
        config.timing_file = get("PARTICIPANT_TIMING_FILE").map(PathBuf::from);
        if let Some(clock) = get("PARTICIPANT_MAIN_CLOCK") {
            config.main_clock = clock;
        }
        if let Some(value) = get("PARTICIPANT_STEP_SIZE_MS") {
            let millis = parse_positive("PARTICIPANT_STEP_SIZE_MS", &value)?;
            config.step_size = Duration::from_millis(millis);
        }
        if let Some(value) = get("PARTICIPANT_RUN_SECONDS") {
            let seconds = parse_positive("PARTICIPANT_RUN_SECONDS", &value)?;
            config.run_for = Some(Duration::from_secs(seconds));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_property(mut self, path: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((path.to_string(), value.into()));
        self
    }

    /// Initial content of the configuration service.
    pub fn to_properties(&self) -> Vec<(String, PropertyValue)> {
        let step_ns = i64::try_from(self.step_size.as_nanos()).unwrap_or(i64::MAX);
        let mut properties = vec![
            (paths::MAIN_CLOCK.to_string(), PropertyValue::from(self.main_clock.as_str())),
            (paths::STEP_SIZE.to_string(), PropertyValue::Int(step_ns)),
        ];
        properties.extend(self.properties.iter().cloned());
        properties
    }
}

fn parse_positive(variable: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            variable,
            value: value.to_string(),
            expected: "a positive integer",
        }),
    }
}
