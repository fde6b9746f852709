//! # Plugin Boundary Flows
//!
//! The demo plugin's components, created through its exported C entry point
//! and listed in a components file, running inside a participant. The
//! plugin is linked in-process, so every call still goes through access
//! structures and proxies.
//!
//! 1. Counter job: registered across the boundary, executed by the host
//!    scheduler, reporting through the host's configuration service
//! 2. Custom clock: registered across the boundary and used as main clock
//! 3. Unknown IID: load fails and leaves nothing registered

#[cfg(test)]
mod tests {
    use super::super::wait_for;
    use component_registry::ComponentSource;
    use demo_plugin::clock::DEMO_CLOCK_PERIOD;
    use demo_plugin::jobs::{COUNTER_CYCLE, COUNTER_LAST_TIME, COUNTER_VALUE};
    use demo_plugin::{
        participant_plugin_arya_create_component, COUNTER_JOB, DEMO_CLOCK_COMPONENT_IID,
        DEMO_JOBS_COMPONENT_IID, DEMO_STEP_CLOCK,
    };
    use participant_runtime::{Participant, ParticipantConfig, ParticipantState};
    use participant_types::{
        ClockService, ClockType, ErrorCode, PropertyValue, LOCAL_SYSTEM_SIMTIME,
    };
    use plugin_bridge::{request_component, CreateComponentFn, SharedBinary};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn components_file(dir: &TempDir, iids: &[&str]) -> PathBuf {
        let entries: String = iids
            .iter()
            .map(|iid| {
                format!(
                    "<component><iid>{}</iid><source type=\"native\"/></component>",
                    iid
                )
            })
            .collect();
        let path = dir.path().join("components.xml");
        std::fs::write(&path, format!("<components>{}</components>", entries)).unwrap();
        path
    }

    /// A participant resolving components file entries through the plugin's
    /// exported factory.
    fn plugin_participant(
        mut config: ParticipantConfig,
        iids: &[&str],
    ) -> (Participant, SharedBinary, TempDir) {
        let dir = TempDir::new().unwrap();
        config.components_file = Some(components_file(&dir, iids));

        let binary = SharedBinary::new("demo-plugin (in-process)");
        let create: CreateComponentFn = participant_plugin_arya_create_component;
        let factory_binary = binary.clone();
        let participant = Participant::new(config).with_native_factory(move |iid| {
            unsafe { request_component(create, iid, factory_binary.clone()) }
                .ok()
                .flatten()
        });
        (participant, binary, dir)
    }

    fn property(participant: &Participant, path: &str) -> Option<i64> {
        participant
            .configuration()
            .get_property(path)
            .and_then(|value| value.as_int())
    }

    #[test]
    fn test_counter_job_runs_across_the_boundary() {
        let config = ParticipantConfig {
            name: "plugin_jobs".to_string(),
            main_clock: LOCAL_SYSTEM_SIMTIME.to_string(),
            step_size: Duration::from_millis(10),
            ..ParticipantConfig::default()
        }
        .with_property("clock/discrete_drive", "external")
        .with_property(COUNTER_CYCLE, PropertyValue::Int(20_000_000));
        let (mut participant, binary, _dir) =
            plugin_participant(config, &[DEMO_JOBS_COMPONENT_IID]);

        participant.load().unwrap();
        assert_eq!(participant.registry().len(), 5);
        assert_eq!(
            participant.registry().source_of(DEMO_JOBS_COMPONENT_IID),
            Some(&ComponentSource::Native)
        );

        participant.initialize().unwrap();
        let infos = participant.job_registry().job_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name(), COUNTER_JOB);
        assert_eq!(infos[0].config().cycle_time, Duration::from_millis(20));
        assert_eq!(participant.job_registry_rpc().get_job_names(), COUNTER_JOB);

        participant.start().unwrap();
        let simtime = participant.clock_service().simtime_clock();
        for _ in 0..4 {
            simtime.step().unwrap();
        }
        assert_eq!(property(&participant, COUNTER_VALUE), Some(3));
        assert_eq!(property(&participant, COUNTER_LAST_TIME), Some(40_000_000));

        participant.stop().unwrap();
        participant.deinitialize().unwrap();
        assert!(participant.job_registry().job_infos().is_empty());
        participant.unload().unwrap();
        assert_eq!(participant.state(), ParticipantState::Unloaded);

        drop(participant);
        assert_eq!(binary.holders(), 1);
    }

    #[test]
    fn test_plugin_clock_drives_the_scheduler() {
        let config = ParticipantConfig {
            name: "plugin_clock".to_string(),
            main_clock: DEMO_STEP_CLOCK.to_string(),
            ..ParticipantConfig::default()
        }
        .with_property(DEMO_CLOCK_PERIOD, PropertyValue::Int(1_000_000))
        .with_property(COUNTER_CYCLE, PropertyValue::Int(10_000_000));
        let (mut participant, _binary, _dir) = plugin_participant(
            config,
            &[DEMO_CLOCK_COMPONENT_IID, DEMO_JOBS_COMPONENT_IID],
        );

        participant.load().unwrap();
        participant.initialize().unwrap();
        let clock_service = participant.clock_service();
        assert!(clock_service.clock_names().contains(&DEMO_STEP_CLOCK.to_string()));
        assert_eq!(
            clock_service.clock_type_of(DEMO_STEP_CLOCK),
            Some(ClockType::Discrete)
        );
        assert_eq!(clock_service.main_clock_name(), DEMO_STEP_CLOCK);

        participant.start().unwrap();
        assert!(wait_for(Duration::from_secs(5), || {
            property(&participant, COUNTER_VALUE).unwrap_or(0) >= 3
        }));
        participant.stop().unwrap();

        let settled = property(&participant, COUNTER_VALUE);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(property(&participant, COUNTER_VALUE), settled);

        participant.deinitialize().unwrap();
        assert!(!clock_service.clock_names().contains(&DEMO_STEP_CLOCK.to_string()));
        participant.unload().unwrap();
    }

    #[test]
    fn test_unknown_iid_fails_load() {
        let (mut participant, _binary, _dir) = plugin_participant(
            ParticipantConfig::default(),
            &[DEMO_JOBS_COMPONENT_IID, "unknown.demo.iid"],
        );
        let err = participant.load().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(participant.state(), ParticipantState::Unloaded);
        assert!(participant.registry().is_empty());
    }
}
