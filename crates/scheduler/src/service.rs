//! # Scheduler Service Component
//!
//! Holds the participant's schedulers and drives the active one through the
//! component lifecycle.
//!
//! | Phase | Effect on the active scheduler |
//! |-------|--------------------------------|
//! | `initialize` | selected by `scheduling/scheduler` |
//! | `tense` | initialized with the clock service and a job snapshot |
//! | `start` / `stop` | started / stopped |
//! | `relax` | deinitialized, snapshot released |

use crate::clock_based::ClockBasedScheduler;
use parking_lot::{Mutex, RwLock};
use participant_types::{
    get_component, paths, property_string, ClockService, Component, ComponentInterface,
    Components, ConfigurationService, ErrorStateNotifier, JobRegistry, ParticipantError, Result,
    Scheduler, SchedulerService, SchedulerState, CLOCK_BASED_SCHEDULER,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct SchedulerServiceComponent {
    schedulers: RwLock<BTreeMap<String, Arc<dyn Scheduler>>>,
    active: RwLock<String>,
    components: Mutex<Option<Arc<dyn Components>>>,
}

impl SchedulerServiceComponent {
    /// Service with the built-in clock based scheduler registered.
    pub fn new(notifier: Option<Arc<dyn ErrorStateNotifier>>) -> Self {
        let builtin: Arc<dyn Scheduler> = Arc::new(ClockBasedScheduler::with_notifier(notifier));
        let mut schedulers = BTreeMap::new();
        schedulers.insert(builtin.name(), builtin);
        Self {
            schedulers: RwLock::new(schedulers),
            active: RwLock::new(CLOCK_BASED_SCHEDULER.to_string()),
            components: Mutex::new(None),
        }
    }

    fn components(&self) -> Result<Arc<dyn Components>> {
        self.components
            .lock()
            .clone()
            .ok_or_else(|| ParticipantError::invalid_state("scheduler service is not created"))
    }

    fn active(&self) -> Result<Arc<dyn Scheduler>> {
        let name = self.active.read().clone();
        self.schedulers
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| ParticipantError::not_found(format!("scheduler '{}' is not registered", name)))
    }
}

impl Default for SchedulerServiceComponent {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Component for SchedulerServiceComponent {
    fn iid(&self) -> &str {
        <dyn SchedulerService as ComponentInterface>::IID
    }

    fn create(&self, components: Arc<dyn Components>) -> Result<()> {
        *self.components.lock() = Some(components);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.components.lock().take();
        Ok(())
    }

    fn initialize(&self) -> Result<()> {
        let components = self.components()?;
        let name = match get_component::<dyn ConfigurationService>(components.as_ref()) {
            Some(config) => property_string(config.as_ref(), paths::SCHEDULER, CLOCK_BASED_SCHEDULER),
            None => {
                warn!("[Scheduler] No configuration service, using the clock based scheduler");
                CLOCK_BASED_SCHEDULER.to_string()
            }
        };
        if !self.schedulers.read().contains_key(&name) {
            error!(scheduler = %name, "[Scheduler] Configured scheduler is not registered");
            return Err(ParticipantError::not_found(format!(
                "scheduler '{}' is not registered",
                name
            )));
        }
        info!(scheduler = %name, "[Scheduler] Active scheduler selected");
        *self.active.write() = name;
        Ok(())
    }

    fn tense(&self) -> Result<()> {
        let components = self.components()?;
        let registry = get_component::<dyn JobRegistry>(components.as_ref())
            .ok_or_else(|| ParticipantError::not_found("job registry"))?;
        let clock_service = get_component::<dyn ClockService>(components.as_ref())
            .ok_or_else(|| ParticipantError::not_found("clock service"))?;
        self.active()?.initialize(clock_service, registry.jobs())
    }

    fn start(&self) -> Result<()> {
        self.active()?.start()
    }

    fn stop(&self) -> Result<()> {
        self.active()?.stop()
    }

    fn relax(&self) -> Result<()> {
        self.active()?.deinitialize()
    }
}

impl SchedulerService for SchedulerServiceComponent {
    fn active_scheduler(&self) -> String {
        self.active.read().clone()
    }

    fn scheduler_names(&self) -> Vec<String> {
        self.schedulers.read().keys().cloned().collect()
    }

    fn register_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> Result<()> {
        let name = scheduler.name();
        let mut schedulers = self.schedulers.write();
        if schedulers.contains_key(&name) {
            return Err(ParticipantError::resource_in_use(format!(
                "scheduler '{}' is already registered",
                name
            )));
        }
        info!(scheduler = %name, "[Scheduler] Scheduler registered");
        schedulers.insert(name, scheduler);
        Ok(())
    }

    fn unregister_scheduler(&self, name: &str) -> Result<()> {
        let mut schedulers = self.schedulers.write();
        let scheduler = schedulers
            .get(name)
            .ok_or_else(|| ParticipantError::not_found(format!("scheduler '{}' is not registered", name)))?;
        if *self.active.read() == name && scheduler.state() == SchedulerState::Started {
            return Err(ParticipantError::invalid_state(format!(
                "scheduler '{}' is running",
                name
            )));
        }
        schedulers.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock_service::ClockServiceComponent;
    use job_registry::JobRegistryComponent;
    use participant_types::{
        ErrorCode, InterfaceHandle, Job, JobConfiguration, JobEntry, PropertyTree, PropertyValue,
        Timestamp, LOCAL_SYSTEM_SIMTIME,
    };
    use std::time::Duration;

    struct Lookup {
        config: Arc<PropertyTree>,
        jobs: Arc<JobRegistryComponent>,
        clocks: Arc<ClockServiceComponent>,
    }

    impl Components for Lookup {
        fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
            let config: Arc<dyn ConfigurationService> = self.config.clone();
            let jobs: Arc<dyn JobRegistry> = self.jobs.clone();
            let clocks: Arc<dyn ClockService> = self.clocks.clone();
            [
                InterfaceHandle::new(config),
                InterfaceHandle::new(jobs),
                InterfaceHandle::new(clocks),
            ]
            .into_iter()
            .find(|handle| handle.iid() == iid)
        }
    }

    #[derive(Default)]
    struct Times(Mutex<Vec<i64>>);

    impl Job for Times {
        fn execute(&self, time: Timestamp) -> Result<()> {
            self.0.lock().push(time.as_millis());
            Ok(())
        }
    }

    struct Named(&'static str);

    impl Scheduler for Named {
        fn name(&self) -> String {
            self.0.to_string()
        }
        fn initialize(&self, _clock_service: Arc<dyn ClockService>, _jobs: Vec<JobEntry>) -> Result<()> {
            Ok(())
        }
        fn start(&self) -> Result<()> {
            Ok(())
        }
        fn stop(&self) -> Result<()> {
            Ok(())
        }
        fn deinitialize(&self) -> Result<()> {
            Ok(())
        }
        fn state(&self) -> SchedulerState {
            SchedulerState::Uninitialized
        }
    }

    fn lookup(properties: Vec<(&str, PropertyValue)>) -> Arc<Lookup> {
        Arc::new(Lookup {
            config: Arc::new(PropertyTree::with_properties(properties)),
            jobs: Arc::new(JobRegistryComponent::new()),
            clocks: Arc::new(ClockServiceComponent::new()),
        })
    }

    #[test]
    fn test_runs_registry_jobs_on_external_simtime() {
        let lookup = lookup(vec![
            ("clock/main_clock", LOCAL_SYSTEM_SIMTIME.into()),
            ("clock/discrete_drive", "external".into()),
            ("clock/step_size", PropertyValue::Int(10_000_000)),
        ]);
        let job = Arc::new(Times::default());
        lookup
            .jobs
            .add_job("sample", job.clone(), JobConfiguration::new(Duration::from_millis(10)))
            .unwrap();

        let service = SchedulerServiceComponent::default();
        let components: Arc<dyn Components> = lookup.clone();
        for component in [&service as &dyn Component, lookup.clocks.as_ref()] {
            component.create(components.clone()).unwrap();
            component.initialize().unwrap();
        }
        lookup.jobs.tense().unwrap();
        service.tense().unwrap();
        lookup.clocks.tense().unwrap();
        service.start().unwrap();
        lookup.clocks.start().unwrap();

        let simtime = lookup.clocks.simtime_clock();
        simtime.step().unwrap();
        simtime.step_to(Timestamp::from_millis(40)).unwrap();
        assert_eq!(*job.0.lock(), vec![0, 10, 20, 30, 40]);

        assert!(service.unregister_scheduler(CLOCK_BASED_SCHEDULER).is_err());
        service.stop().unwrap();
        lookup.clocks.stop().unwrap();
        service.relax().unwrap();
        assert!(service.unregister_scheduler(CLOCK_BASED_SCHEDULER).is_ok());
    }

    #[test]
    fn test_unknown_configured_scheduler() {
        let lookup = lookup(vec![("scheduling/scheduler", "round_robin".into())]);
        let service = SchedulerServiceComponent::default();
        service.create(lookup).unwrap();
        let err = service.initialize().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_scheduler_registration() {
        let service = SchedulerServiceComponent::default();
        service.register_scheduler(Arc::new(Named("b_custom"))).unwrap();
        let err = service.register_scheduler(Arc::new(Named("b_custom"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceInUse);
        assert_eq!(
            service.scheduler_names(),
            vec!["b_custom".to_string(), CLOCK_BASED_SCHEDULER.to_string()]
        );

        let lookup = lookup(vec![("scheduling/scheduler", "b_custom".into())]);
        service.create(lookup).unwrap();
        service.initialize().unwrap();
        assert_eq!(service.active_scheduler(), "b_custom");

        assert_eq!(
            service.unregister_scheduler("missing").unwrap_err().code,
            ErrorCode::NotFound
        );
    }
}
