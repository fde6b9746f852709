//! # Job Registry Flows
//!
//! Timing files and the read-only RPC surface against a participant's job
//! registry.

#[cfg(test)]
mod tests {
    use super::super::RecordingJob;
    use job_registry::rpc::GET_JOB_INFO;
    use job_registry::{reconfigure_jobs_from_timing, TimingConfiguration};
    use participant_runtime::{Participant, ParticipantConfig};
    use participant_types::{ErrorCode, JobConfiguration, TimeViolationStrategy};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<timing>
    <schema_version>1.0</schema_version>
    <header>
        <author>integration</author>
        <date_creation>2024-03-01</date_creation>
        <date_change>2024-03-02</date_change>
        <description>control loop</description>
    </header>
    <participants>
        <participant>
            <name>controller</name>
            <jobs>
                <job>
                    <name>control</name>
                    <cycle_time>5000</cycle_time>
                    <cycle_delay_time>1000</cycle_delay_time>
                    <max_run_realtime>2000</max_run_realtime>
                    <run_realtime_violation>skip_output_publish</run_realtime_violation>
                </job>
            </jobs>
        </participant>
    </participants>
</timing>"#;

    fn loaded(name: &str) -> Participant {
        let mut participant = Participant::new(ParticipantConfig {
            name: name.to_string(),
            ..ParticipantConfig::default()
        });
        participant.load().unwrap();
        participant
            .job_registry()
            .add_job(
                "control",
                Arc::new(RecordingJob::default()),
                JobConfiguration::new(Duration::from_millis(10)).depends_on(vec!["sensor"]),
            )
            .unwrap();
        participant
    }

    #[test]
    fn test_timing_file_applies_to_named_participant() {
        let participant = loaded("controller");
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TIMING).unwrap();
        participant.apply_timing_configuration(file.path()).unwrap();

        let info = participant.job_registry_rpc().get_job_info("control");
        assert_eq!(info.cycle_sim_time, 5_000_000);
        assert_eq!(info.delay_sim_time, 1_000_000);
        assert_eq!(info.max_runtime_real_time, Some(2_000_000));
        assert_eq!(
            info.runtime_violation_strategy,
            TimeViolationStrategy::SkipOutputPublish.as_str()
        );
        assert_eq!(info.jobs_this_depends_on, vec!["sensor".to_string()]);
    }

    #[test]
    fn test_missing_participant_changes_nothing() {
        let participant = loaded("someone_else");
        let before = participant.job_registry().job_infos();
        let timing = TimingConfiguration::parse(TIMING).unwrap();
        let err = reconfigure_jobs_from_timing(
            participant.job_registry().as_ref(),
            &timing,
            "someone_else",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(participant.job_registry().job_infos(), before);
    }

    #[test]
    fn test_job_set_frozen_after_initialize() {
        let mut participant = loaded("frozen");
        participant.initialize().unwrap();
        let err = participant
            .job_registry()
            .add_job(
                "late",
                Arc::new(RecordingJob::default()),
                JobConfiguration::new(Duration::from_millis(10)),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert_eq!(
            participant
                .apply_timing_configuration("/nonexistent/timing.xml")
                .unwrap_err()
                .code,
            ErrorCode::InvalidState
        );
    }

    #[test]
    fn test_rpc_surface_as_json() {
        let participant = loaded("rpc");
        let rpc = participant.job_registry_rpc();

        let info = rpc.call(GET_JOB_INFO, &json!({ "job_name": "control" })).unwrap();
        assert_eq!(info["job_name"], "control");
        assert_eq!(info["cycle_sim_time"], 10_000_000);
        assert!(info["max_runtime_real_time"].is_null());

        let blank = rpc.call(GET_JOB_INFO, &json!({ "job_name": "missing" })).unwrap();
        assert_eq!(blank["job_name"], "");
        assert!(rpc.call("unknownMethod", &json!({})).is_err());
    }
}
