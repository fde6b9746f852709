//! Applies a timing configuration to the jobs of one participant.
//!
//! Every registered job must appear in the participant's table. All new
//! configurations are validated before the first one is committed, so a
//! failure leaves every job as it was.

use crate::timing::TimingConfiguration;
use participant_types::{JobConfiguration, JobRegistry, ParticipantError, Result};
use tracing::{error, info};

pub fn reconfigure_jobs_from_timing(
    registry: &dyn JobRegistry,
    timing: &TimingConfiguration,
    participant: &str,
) -> Result<()> {
    let table = timing.participant(participant).ok_or_else(|| {
        error!(participant, "[JobRegistry] Participant missing from timing configuration");
        ParticipantError::not_found(format!(
            "participant '{}' is not part of the timing configuration",
            participant
        ))
    })?;

    let mut planned: Vec<(String, JobConfiguration)> = Vec::new();
    for info in registry.job_infos() {
        let entry = table.job(info.name()).ok_or_else(|| {
            ParticipantError::not_found(format!(
                "job '{}' of participant '{}' is not part of the timing configuration",
                info.name(),
                participant
            ))
        })?;
        let config = entry.to_configuration(info.config().dependencies.clone());
        config.validate().map_err(|e| {
            error!(job = info.name(), error = %e, "[JobRegistry] Invalid timing for job");
            e.context(format!("job '{}'", info.name()))
        })?;
        planned.push((info.name().to_string(), config));
    }

    for (name, config) in planned {
        registry.reconfigure_job(&name, config)?;
    }
    info!(participant, "[JobRegistry] Jobs reconfigured from timing configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JobRegistryComponent;
    use crate::timing::{TimingJob, TimingParticipant};
    use participant_types::{ErrorCode, Job, Timestamp, TimeViolationStrategy};
    use std::sync::Arc;
    use std::time::Duration;

    struct Noop;

    impl Job for Noop {
        fn execute(&self, _time: Timestamp) -> Result<()> {
            Ok(())
        }
    }

    fn timing_job(name: &str, cycle_ms: u64) -> TimingJob {
        TimingJob {
            name: name.to_string(),
            cycle_time: Duration::from_millis(cycle_ms),
            delay_time: Duration::ZERO,
            max_runtime: Duration::ZERO,
            runtime_violation_strategy: TimeViolationStrategy::Ignore,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn timing(jobs: Vec<TimingJob>) -> TimingConfiguration {
        TimingConfiguration {
            participants: vec![TimingParticipant {
                name: "me".to_string(),
                jobs,
            }],
            ..TimingConfiguration::default()
        }
    }

    fn registry() -> JobRegistryComponent {
        let registry = JobRegistryComponent::new();
        let config = JobConfiguration::new(Duration::from_millis(1)).depends_on(vec!["x"]);
        registry.add_job("a", Arc::new(Noop), config.clone()).unwrap();
        registry.add_job("b", Arc::new(Noop), config).unwrap();
        registry
    }

    fn cycles(registry: &JobRegistryComponent) -> Vec<Duration> {
        registry
            .job_infos()
            .iter()
            .map(|info| info.config().cycle_time)
            .collect()
    }

    #[test]
    fn test_applies_all_and_keeps_dependencies() {
        let registry = registry();
        reconfigure_jobs_from_timing(
            &registry,
            &timing(vec![timing_job("b", 20), timing_job("a", 10)]),
            "me",
        )
        .unwrap();

        assert_eq!(
            cycles(&registry),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(registry.job_infos()[0].config().dependencies, vec!["x".to_string()]);
    }

    #[test]
    fn test_missing_participant_changes_nothing() {
        let registry = registry();
        let err = reconfigure_jobs_from_timing(&registry, &timing(vec![]), "other").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(cycles(&registry), vec![Duration::from_millis(1); 2]);
    }

    #[test]
    fn test_missing_job_changes_nothing() {
        let registry = registry();
        let err = reconfigure_jobs_from_timing(&registry, &timing(vec![timing_job("a", 10)]), "me")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.description.contains("'b'"));
        assert_eq!(cycles(&registry), vec![Duration::from_millis(1); 2]);
    }

    #[test]
    fn test_invalid_later_job_changes_nothing() {
        let registry = registry();
        let mut bad = timing_job("b", 20);
        bad.runtime_violation_strategy = TimeViolationStrategy::Unknown;

        let err = reconfigure_jobs_from_timing(
            &registry,
            &timing(vec![timing_job("a", 10), bad]),
            "me",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert!(err.description.contains("job 'b'"));
        assert!(err.description.contains("runtime_violation_strategy"));
        assert_eq!(cycles(&registry), vec![Duration::from_millis(1); 2]);
    }
}
