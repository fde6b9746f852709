//! # Dynamic Loading Flows
//!
//! The demo plugin loaded from its shared library. Skipped when the library
//! has not been built next to the test binary.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;

/// The demo plugin's shared library near the running test binary.
pub fn demo_plugin_library() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let name = format!("{}demo_plugin{}", DLL_PREFIX, DLL_SUFFIX);
    exe.ancestors()
        .skip(1)
        .take(3)
        .flat_map(|dir| [dir.join(&name), dir.join("deps").join(&name)])
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::demo_plugin_library;
    use component_registry::{ComponentSource, PluginError, PluginLibrary};
    use demo_plugin::jobs::{COUNTER_CYCLE, COUNTER_VALUE};
    use demo_plugin::{COUNTER_JOB, DEMO_JOBS_COMPONENT_IID, PLUGIN_VERSION};
    use participant_runtime::{Participant, ParticipantConfig};
    use participant_types::{PropertyValue, LOCAL_SYSTEM_SIMTIME};
    use std::time::Duration;

    macro_rules! require_library {
        () => {
            match demo_plugin_library() {
                Some(path) => path,
                None => {
                    eprintln!("demo plugin library not built, skipping");
                    return;
                }
            }
        };
    }

    #[test]
    fn test_library_metadata() {
        let path = require_library!();
        let library = PluginLibrary::load(&path).expect("load demo plugin");
        assert_eq!(library.version(), PLUGIN_VERSION);
        assert_eq!(library.is_debug_build(), cfg!(debug_assertions));
        assert_eq!(library.path(), path.as_path());

        let handle = library
            .create_component(DEMO_JOBS_COMPONENT_IID)
            .expect("jobs component");
        assert_eq!(handle.iid(), DEMO_JOBS_COMPONENT_IID);
        assert!(library.holders() > 1);
        drop(handle);
        assert_eq!(library.holders(), 1);

        assert!(matches!(
            library.create_component("unknown.demo.iid"),
            Err(PluginError::NotCapable { .. })
        ));
    }

    #[test]
    fn test_components_file_loads_plugin() {
        let path = require_library!();
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("components.xml");
        std::fs::write(
            &file,
            format!(
                "<components><component><iid>{}</iid><source type=\"plugin\">{}</source></component></components>",
                DEMO_JOBS_COMPONENT_IID,
                path.display()
            ),
        )
        .unwrap();

        let config = ParticipantConfig {
            name: "dynamic".to_string(),
            components_file: Some(file),
            main_clock: LOCAL_SYSTEM_SIMTIME.to_string(),
            step_size: Duration::from_millis(10),
            ..ParticipantConfig::default()
        }
        .with_property("clock/discrete_drive", "external")
        .with_property(COUNTER_CYCLE, PropertyValue::Int(10_000_000));
        let mut participant = Participant::new(config);

        participant.load().unwrap();
        assert_eq!(participant.registry().plugin_count(), 1);
        assert_eq!(
            participant.registry().source_of(DEMO_JOBS_COMPONENT_IID),
            Some(&ComponentSource::Plugin(path.clone()))
        );

        participant.initialize().unwrap();
        assert_eq!(participant.job_registry().job_infos()[0].name(), COUNTER_JOB);
        participant.start().unwrap();
        let simtime = participant.clock_service().simtime_clock();
        simtime.step().unwrap();
        simtime.step().unwrap();
        assert_eq!(
            participant.configuration().get_property(COUNTER_VALUE),
            Some(PropertyValue::Int(3))
        );

        participant.shutdown().unwrap();
        assert_eq!(participant.registry().plugin_count(), 0);
    }
}
