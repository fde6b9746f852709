//! Read-only query surface of the job registry for inspection tooling.
//!
//! The transport is not part of this crate; [`JobRegistryRpc::call`] maps a
//! method name and JSON arguments to a JSON result for whichever transport
//! hosts it.

use participant_types::{JobRegistry, ParticipantError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const GET_JOB_NAMES: &str = "getJobNames";
pub const GET_JOB_INFO: &str = "getJobInfo";

/// Description of one job. All fields are blank for an unknown job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfoRecord {
    pub job_name: String,
    /// Nanoseconds.
    pub cycle_sim_time: u64,
    /// Nanoseconds.
    pub delay_sim_time: u64,
    /// Nanoseconds; absent if unchecked.
    pub max_runtime_real_time: Option<u64>,
    pub runtime_violation_strategy: String,
    pub jobs_this_depends_on: Vec<String>,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

pub struct JobRegistryRpc {
    registry: Arc<dyn JobRegistry>,
}

impl JobRegistryRpc {
    pub fn new(registry: Arc<dyn JobRegistry>) -> Self {
        Self { registry }
    }

    /// Registered job names joined by `,`, in registration order.
    pub fn get_job_names(&self) -> String {
        self.registry
            .job_infos()
            .iter()
            .map(|info| info.name())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn get_job_info(&self, name: &str) -> JobInfoRecord {
        let Some(info) = self
            .registry
            .job_infos()
            .into_iter()
            .find(|info| info.name() == name)
        else {
            return JobInfoRecord::default();
        };
        let config = info.config();
        JobInfoRecord {
            job_name: info.name().to_string(),
            cycle_sim_time: nanos(config.cycle_time),
            delay_sim_time: nanos(config.delay_time),
            max_runtime_real_time: config.checked_max_runtime().map(nanos),
            runtime_violation_strategy: config.runtime_violation_strategy.to_string(),
            jobs_this_depends_on: config.dependencies.clone(),
        }
    }

    /// Dispatch a request by method name.
    pub fn call(&self, method: &str, arguments: &Value) -> Result<Value> {
        match method {
            GET_JOB_NAMES => Ok(Value::String(self.get_job_names())),
            GET_JOB_INFO => {
                let name = arguments
                    .get("job_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ParticipantError::invalid_argument("getJobInfo expects 'job_name'")
                    })?;
                serde_json::to_value(self.get_job_info(name))
                    .map_err(|e| ParticipantError::unexpected(e.to_string()))
            }
            other => Err(ParticipantError::not_supported(format!(
                "unknown method '{}'",
                other
            ))),
        }
    }
}
