//! # Timing Configuration
//!
//! Reads the timing file that assigns cycle times to the jobs of every
//! participant in a system.
//!
//! ```text
//! timing
//! ├── schema_version
//! ├── header { author, date_creation, date_change, description }
//! └── participants
//!     └── participant { name, jobs }
//!         └── job { name, cycle_time, cycle_delay_time, max_run_realtime,
//!                   run_realtime_violation, data_references? }
//! ```
//!
//! Times are given in microseconds and stored as nanosecond durations.

use participant_types::{
    DataReference, JobConfiguration, ParticipantError, Result, TimeViolationStrategy, XmlElement,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingHeader {
    pub author: String,
    pub date_creation: String,
    pub date_change: String,
    pub description: String,
}

/// Timing of one job as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingJob {
    pub name: String,
    pub cycle_time: Duration,
    pub delay_time: Duration,
    pub max_runtime: Duration,
    /// `Unknown` if the file names no known strategy.
    pub runtime_violation_strategy: TimeViolationStrategy,
    pub inputs: Vec<DataReference>,
    pub outputs: Vec<DataReference>,
}

impl TimingJob {
    /// Configuration described by this entry. Dependencies are not part of
    /// the timing file and are carried over by the caller.
    pub fn to_configuration(&self, dependencies: Vec<String>) -> JobConfiguration {
        let mut config = JobConfiguration::new(self.cycle_time)
            .with_delay(self.delay_time)
            .with_max_runtime(self.max_runtime, self.runtime_violation_strategy)
            .with_inputs(self.inputs.clone())
            .with_outputs(self.outputs.clone());
        config.dependencies = dependencies;
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingParticipant {
    pub name: String,
    pub jobs: Vec<TimingJob>,
}

impl TimingParticipant {
    pub fn job(&self, name: &str) -> Option<&TimingJob> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfiguration {
    pub schema_version: String,
    pub header: TimingHeader,
    pub participants: Vec<TimingParticipant>,
}

impl TimingConfiguration {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ParticipantError::not_found(format!("timing file '{}': {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|e| e.context(format!("timing file '{}'", path.display())))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let root = XmlElement::parse(text)?;
        if root.name != "timing" {
            return Err(ParticipantError::invalid_argument(format!(
                "expected root node 'timing', found '{}'",
                root.name
            )));
        }

        let schema_version = root.required_text("schema_version")?.to_string();
        let header = parse_header(root.required_child("header")?);

        let mut participants = Vec::new();
        for node in root.required_child("participants")?.children_named("participant") {
            participants.push(parse_participant(node)?);
        }

        debug!(
            %schema_version,
            participants = participants.len(),
            "[JobRegistry] Timing configuration parsed"
        );
        Ok(Self {
            schema_version,
            header,
            participants,
        })
    }

    pub fn participant(&self, name: &str) -> Option<&TimingParticipant> {
        self.participants.iter().find(|p| p.name == name)
    }
}

fn parse_header(node: &XmlElement) -> TimingHeader {
    let text = |name: &str| node.optional_text(name).unwrap_or_default().to_string();
    TimingHeader {
        author: text("author"),
        date_creation: text("date_creation"),
        date_change: text("date_change"),
        description: text("description"),
    }
}

fn parse_participant(node: &XmlElement) -> Result<TimingParticipant> {
    let name = node.required_text("name")?.to_string();
    let mut jobs = Vec::new();
    for job in node.required_child("jobs")?.children_named("job") {
        jobs.push(parse_job(job).map_err(|e| e.context(format!("participant '{}'", name)))?);
    }
    Ok(TimingParticipant { name, jobs })
}

fn parse_job(node: &XmlElement) -> Result<TimingJob> {
    let name = node.required_text("name")?.to_string();
    let in_job = |e: ParticipantError| e.context(format!("job '{}'", name));

    let cycle_time = micros(node, "cycle_time").map_err(in_job)?;
    let delay_time = micros(node, "cycle_delay_time").map_err(in_job)?;
    let max_runtime = micros(node, "max_run_realtime").map_err(in_job)?;
    let strategy = node
        .required_text("run_realtime_violation")
        .map_err(in_job)?
        .parse()
        .unwrap_or(TimeViolationStrategy::Unknown);

    let (inputs, outputs) = match node.child("data_references") {
        Some(references) => (
            parse_references(references, "inputs", "input_reference").map_err(in_job)?,
            parse_references(references, "outputs", "output_reference").map_err(in_job)?,
        ),
        None => (Vec::new(), Vec::new()),
    };

    Ok(TimingJob {
        name,
        cycle_time,
        delay_time,
        max_runtime,
        runtime_violation_strategy: strategy,
        inputs,
        outputs,
    })
}

fn parse_references(node: &XmlElement, group: &str, item: &str) -> Result<Vec<DataReference>> {
    let Some(group) = node.child(group) else {
        return Ok(Vec::new());
    };
    group
        .children_named(item)
        .map(|reference| {
            let name = reference.required_text("name")?;
            let queue_size = integer(reference, "queue_size")?;
            if queue_size < 0 {
                return Err(ParticipantError::invalid_argument(format!(
                    "queue_size of '{}': must be >= 0, got {}",
                    name, queue_size
                )));
            }
            Ok(DataReference::new(name, queue_size))
        })
        .collect()
}

fn integer(node: &XmlElement, name: &str) -> Result<i64> {
    let text = node.required_text(name)?;
    text.trim().parse().map_err(|_| {
        ParticipantError::invalid_argument(format!(
            "value '{}' of node '{}' is not an integer",
            text, name
        ))
    })
}

fn micros(node: &XmlElement, name: &str) -> Result<Duration> {
    let value = integer(node, name)?;
    let value = u64::try_from(value).map_err(|_| {
        ParticipantError::invalid_argument(format!("{}: must be >= 0, got {}", name, value))
    })?;
    Ok(Duration::from_micros(value))
}
