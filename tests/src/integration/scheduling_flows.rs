//! # Scheduling Flows
//!
//! A participant's scheduler driven by the real clock service.
//!
//! 1. Discrete: catch-up over the externally stepped simtime clock
//! 2. Restart: stop/start re-runs t=0 exactly once
//! 3. Continuous: the realtime clock never runs a job twice per cycle

#[cfg(test)]
mod tests {
    use super::super::{wait_for, RecordingJob};
    use participant_runtime::{Participant, ParticipantConfig, ParticipantState};
    use participant_types::{
        ClockService, JobConfiguration, Timestamp, LOCAL_SYSTEM_REALTIME, LOCAL_SYSTEM_SIMTIME,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn external_simtime(name: &str) -> ParticipantConfig {
        ParticipantConfig {
            name: name.to_string(),
            main_clock: LOCAL_SYSTEM_SIMTIME.to_string(),
            step_size: Duration::from_millis(10),
            ..ParticipantConfig::default()
        }
        .with_property("clock/discrete_drive", "external")
    }

    fn running(config: ParticipantConfig, jobs: &[(&str, &Arc<RecordingJob>, u64)]) -> Participant {
        let mut participant = Participant::new(config);
        participant.load().expect("load");
        for (name, job, cycle_ms) in jobs {
            let job: Arc<RecordingJob> = Arc::clone(job);
            participant
                .job_registry()
                .add_job(name, job, JobConfiguration::new(Duration::from_millis(*cycle_ms)))
                .expect("add job");
        }
        participant.initialize().expect("initialize");
        participant.start().expect("start");
        participant
    }

    #[test]
    fn test_discrete_catch_up_in_one_tick() {
        let job = Arc::new(RecordingJob::default());
        let participant = running(external_simtime("catch_up"), &[("j", &job, 10)]);

        participant
            .clock_service()
            .simtime_clock()
            .step_to(Timestamp::from_millis(50))
            .unwrap();
        assert_eq!(job.millis(), vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_discrete_catch_up_with_stepping() {
        let fast = Arc::new(RecordingJob::default());
        let slow = Arc::new(RecordingJob::default());
        let participant = running(
            external_simtime("stepping"),
            &[("fast", &fast, 10), ("slow", &slow, 30)],
        );
        let simtime = participant.clock_service().simtime_clock();

        simtime.step_to(Timestamp::from_millis(20)).unwrap();
        assert_eq!(fast.millis(), vec![0, 10, 20]);
        for _ in 0..4 {
            simtime.step().unwrap();
        }
        assert_eq!(fast.millis(), vec![0, 10, 20, 30, 40, 50, 60]);
        assert_eq!(slow.millis(), vec![0, 30, 60]);
        assert_eq!(participant.clock_service().time(), Timestamp::from_millis(60));
    }

    #[test]
    fn test_restart_runs_time_zero_once() {
        let job = Arc::new(RecordingJob::default());
        let mut participant = running(external_simtime("restart"), &[("j", &job, 10)]);
        let simtime = participant.clock_service().simtime_clock();
        simtime.step().unwrap();
        simtime.step().unwrap();
        assert_eq!(job.millis(), vec![0, 10, 20]);

        participant.stop().unwrap();
        assert!(simtime.step().is_err());
        participant.start().unwrap();
        assert_eq!(participant.clock_service().time(), Timestamp::ZERO);

        simtime.step_to(Timestamp::ZERO).unwrap();
        simtime.step_to(Timestamp::ZERO).unwrap();
        simtime.step().unwrap();
        assert_eq!(job.millis(), vec![0, 10, 20, 0, 10]);
    }

    #[test]
    fn test_pause_keeps_job_snapshot() {
        let job = Arc::new(RecordingJob::default());
        let mut participant = running(external_simtime("pause"), &[("j", &job, 10)]);
        participant.pause().unwrap();
        assert_eq!(participant.state(), ParticipantState::Paused);
        participant.start().unwrap();
        participant.clock_service().simtime_clock().step().unwrap();
        assert_eq!(job.millis(), vec![0, 10]);
    }

    #[test]
    fn test_continuous_runs_at_most_once_per_cycle() {
        let job = Arc::new(RecordingJob::default());
        let config = ParticipantConfig {
            name: "continuous".to_string(),
            main_clock: LOCAL_SYSTEM_REALTIME.to_string(),
            ..ParticipantConfig::default()
        };
        let mut participant = running(config, &[("j", &job, 10)]);
        assert!(wait_for(Duration::from_secs(5), || job.times().len() >= 5));
        participant.stop().unwrap();

        let times = job.times();
        let windows: Vec<i64> = times.iter().map(|t| t.as_nanos() / 10_000_000).collect();
        assert!(windows.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", times);

        let settled = job.times().len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(job.times().len(), settled);
    }
}
