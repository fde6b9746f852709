//! # Jobs and the Job Registry Interface
//!
//! A [`Job`] is a named unit of periodic work with three phases. Its timing
//! is described by a [`JobConfiguration`]; the pair of name and
//! configuration is a [`JobInfo`]; a registered job is a [`JobEntry`].
//!
//! ## Phases
//!
//! ```text
//! execute_data_in(t) → execute(t) → execute_data_out(t)
//! ```
//!
//! Only `execute` is timed against `max_runtime`.

use crate::component::{Component, ComponentInterface};
use crate::errors::{ParticipantError, Result};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A unit of periodic work.
pub trait Job: Send + Sync {
    /// Ingest pending input.
    fn execute_data_in(&self, _time: Timestamp) -> Result<()> {
        Ok(())
    }

    /// Run the job's logic.
    fn execute(&self, time: Timestamp) -> Result<()>;

    /// Publish output.
    fn execute_data_out(&self, _time: Timestamp) -> Result<()> {
        Ok(())
    }
}

/// What to do when `execute` takes longer than `max_runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum TimeViolationStrategy {
    Ignore = 0,
    Warn = 1,
    SkipOutputPublish = 2,
    SetStateToError = 3,
    /// Placeholder for unparseable input. Rejected by validation.
    Unknown = 4,
}

impl TimeViolationStrategy {
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ignore,
            1 => Self::Warn,
            2 => Self::SkipOutputPublish,
            3 => Self::SetStateToError,
            _ => Self::Unknown,
        }
    }

    /// Name used in timing files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore_runtime_violation",
            Self::Warn => "warn_about_runtime_violation",
            Self::SkipOutputPublish => "skip_output_publish",
            Self::SetStateToError => "set_participant_to_error_state",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for TimeViolationStrategy {
    type Err = ParticipantError;

    fn from_str(text: &str) -> Result<Self> {
        match text.trim() {
            "ignore_runtime_violation" | "ignore" => Ok(Self::Ignore),
            "warn_about_runtime_violation" | "warn" => Ok(Self::Warn),
            "skip_output_publish" => Ok(Self::SkipOutputPublish),
            "set_participant_to_error_state" | "set_state_to_error" => Ok(Self::SetStateToError),
            other => Err(ParticipantError::invalid_argument(format!(
                "unknown runtime violation strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeViolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named input or output queue of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    pub name: String,
    pub queue_size: i64,
}

impl DataReference {
    pub fn new(name: impl Into<String>, queue_size: i64) -> Self {
        Self {
            name: name.into(),
            queue_size,
        }
    }
}

/// Timing of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Simulation-time period. Must be non-zero.
    pub cycle_time: Duration,
    /// Offset of the first execution after a reset.
    pub delay_time: Duration,
    /// Wall-clock budget for `execute`. `None` or zero means unchecked.
    pub max_runtime: Option<Duration>,
    pub runtime_violation_strategy: TimeViolationStrategy,
    /// Names of jobs this job depends on.
    pub dependencies: Vec<String>,
    pub inputs: Vec<DataReference>,
    pub outputs: Vec<DataReference>,
}

impl JobConfiguration {
    /// A configuration with the given cycle time, no delay, and no runtime check.
    pub fn new(cycle_time: Duration) -> Self {
        Self {
            cycle_time,
            delay_time: Duration::ZERO,
            max_runtime: None,
            runtime_violation_strategy: TimeViolationStrategy::Ignore,
            dependencies: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay_time: Duration) -> Self {
        self.delay_time = delay_time;
        self
    }

    #[must_use]
    pub fn with_max_runtime(
        mut self,
        max_runtime: Duration,
        strategy: TimeViolationStrategy,
    ) -> Self {
        self.max_runtime = Some(max_runtime);
        self.runtime_violation_strategy = strategy;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, jobs: Vec<&str>) -> Self {
        self.dependencies = jobs.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<DataReference>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<DataReference>) -> Self {
        self.outputs = outputs;
        self
    }

    /// The runtime budget, if one is actually enforced.
    #[must_use]
    pub fn checked_max_runtime(&self) -> Option<Duration> {
        self.max_runtime.filter(|limit| !limit.is_zero())
    }

    /// Check every field. The error names the failing field and constraint.
    pub fn validate(&self) -> Result<()> {
        if self.cycle_time.is_zero() {
            return Err(ParticipantError::invalid_argument(
                "cycle_time: must be greater than 0",
            ));
        }
        if self.runtime_violation_strategy == TimeViolationStrategy::Unknown {
            return Err(ParticipantError::invalid_argument(
                "runtime_violation_strategy: must be a known strategy",
            ));
        }
        for reference in self.inputs.iter().chain(&self.outputs) {
            if reference.queue_size < 0 {
                return Err(ParticipantError::invalid_argument(format!(
                    "queue_size of '{}': must be >= 0, got {}",
                    reference.name, reference.queue_size
                )));
            }
        }
        Ok(())
    }
}

/// A job's name with its current configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    name: String,
    config: JobConfiguration,
}

impl JobInfo {
    /// Create a job info. Fails if `config` does not validate.
    pub fn new(name: impl Into<String>, config: JobConfiguration) -> Result<Self> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| e.context(format!("job '{}'", name)))?;
        Ok(Self { name, config })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &JobConfiguration {
        &self.config
    }

    /// Replace the configuration. Leaves it unchanged if `config` is invalid.
    pub fn reconfigure(&mut self, config: JobConfiguration) -> Result<()> {
        config
            .validate()
            .map_err(|e| e.context(format!("job '{}'", self.name)))?;
        self.config = config;
        Ok(())
    }
}

/// A registered job: shared ownership of the job plus its info.
#[derive(Clone)]
pub struct JobEntry {
    pub job: Arc<dyn Job>,
    pub info: JobInfo,
}

impl JobEntry {
    pub fn new(job: Arc<dyn Job>, info: JobInfo) -> Self {
        Self { job, info }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.info.name()
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry").field("info", &self.info).finish()
    }
}

/// Store of the participant's jobs.
pub trait JobRegistry: Component {
    /// Register `job` under `name`.
    ///
    /// Fails with `resource_in_use` if the name is taken, or
    /// `invalid_argument` if `config` does not validate. Nothing is stored
    /// on failure.
    fn add_job(&self, name: &str, job: Arc<dyn Job>, config: JobConfiguration) -> Result<()>;

    /// Fails with `not_found` if no job is registered under `name`.
    fn remove_job(&self, name: &str) -> Result<()>;

    /// All job infos, in registration order.
    fn job_infos(&self) -> Vec<JobInfo>;

    /// All entries, in registration order. Entries share the jobs.
    fn jobs(&self) -> Vec<JobEntry>;

    /// Replace the configuration of a registered job.
    fn reconfigure_job(&self, name: &str, config: JobConfiguration) -> Result<()>;
}

impl ComponentInterface for dyn JobRegistry {
    const IID: &'static str = "job_registry.arya.participant.iid";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn test_validate_rejects_zero_cycle() {
        let err = JobConfiguration::new(Duration::ZERO).validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert!(err.description.contains("cycle_time"));
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let config = JobConfiguration::new(Duration::from_millis(10))
            .with_max_runtime(Duration::from_millis(1), TimeViolationStrategy::Unknown);
        let err = config.validate().unwrap_err();
        assert!(err.description.contains("runtime_violation_strategy"));
    }

    #[test]
    fn test_validate_rejects_negative_queue() {
        let config = JobConfiguration::new(Duration::from_millis(10))
            .with_inputs(vec![DataReference::new("speed", -1)]);
        let err = config.validate().unwrap_err();
        assert!(err.description.contains("speed"));
    }

    #[test]
    fn test_reconfigure_keeps_old_on_failure() {
        let original = JobConfiguration::new(Duration::from_millis(10));
        let mut info = JobInfo::new("ping", original.clone()).expect("valid");

        let err = info
            .reconfigure(JobConfiguration::new(Duration::ZERO))
            .unwrap_err();
        assert!(err.description.starts_with("job 'ping'"));
        assert_eq!(info.config(), &original);

        let updated = JobConfiguration::new(Duration::from_millis(20));
        info.reconfigure(updated.clone()).expect("valid");
        assert_eq!(info.config(), &updated);
    }

    #[test]
    fn test_strategy_names_parse_back() {
        for strategy in [
            TimeViolationStrategy::Ignore,
            TimeViolationStrategy::Warn,
            TimeViolationStrategy::SkipOutputPublish,
            TimeViolationStrategy::SetStateToError,
        ] {
            assert_eq!(strategy.as_str().parse::<TimeViolationStrategy>().ok(), Some(strategy));
            assert_eq!(TimeViolationStrategy::from_i32(strategy as i32), strategy);
        }
        assert!("bogus".parse::<TimeViolationStrategy>().is_err());
    }

    #[test]
    fn test_zero_max_runtime_is_unchecked() {
        let config = JobConfiguration::new(Duration::from_millis(10))
            .with_max_runtime(Duration::ZERO, TimeViolationStrategy::Warn);
        assert_eq!(config.checked_max_runtime(), None);
    }
}
