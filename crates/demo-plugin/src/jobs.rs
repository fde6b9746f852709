//! Job-providing component. Adds a counter job to the host's job registry
//! and publishes the job's progress as configuration properties.

use parking_lot::Mutex;
use participant_types::{
    get_component, property_duration, Component, Components, ConfigurationService, Job,
    JobConfiguration, JobRegistry, ParticipantError, PropertyValue, Result, Timestamp,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEMO_JOBS_COMPONENT_IID: &str = "demo_jobs_component.arya.demo.iid";
pub const COUNTER_JOB: &str = "demo_counter";
/// Cycle time of the counter job in ns.
pub const COUNTER_CYCLE: &str = "demo/counter_cycle";
/// Number of counter executions, written by the job.
pub const COUNTER_VALUE: &str = "demo/counter_value";
/// Time of the last counter execution in ns, written by the job.
pub const COUNTER_LAST_TIME: &str = "demo/counter_last_time";

const DEFAULT_CYCLE: Duration = Duration::from_millis(10);

pub struct CounterJob {
    count: AtomicI64,
    configuration: Option<Arc<dyn ConfigurationService>>,
}

impl CounterJob {
    pub fn new(configuration: Option<Arc<dyn ConfigurationService>>) -> Self {
        Self {
            count: AtomicI64::new(0),
            configuration,
        }
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Job for CounterJob {
    fn execute(&self, _time: Timestamp) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn execute_data_out(&self, time: Timestamp) -> Result<()> {
        if let Some(config) = &self.configuration {
            config.set_property(COUNTER_VALUE, PropertyValue::Int(self.count()))?;
            config.set_property(COUNTER_LAST_TIME, PropertyValue::Int(time.as_nanos()))?;
        }
        Ok(())
    }
}

/// Owns the counter job's registration from `initialize` to `deinitialize`.
#[derive(Default)]
pub struct DemoJobsComponent {
    components: Mutex<Option<Arc<dyn Components>>>,
    registry: Mutex<Option<Arc<dyn JobRegistry>>>,
}

impl DemoJobsComponent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for DemoJobsComponent {
    fn iid(&self) -> &str {
        DEMO_JOBS_COMPONENT_IID
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
        let components = self
            .components
            .lock()
            .clone()
            .ok_or_else(|| ParticipantError::invalid_state("demo jobs component is not created"))?;
        let configuration = get_component::<dyn ConfigurationService>(components.as_ref());
        let cycle = match &configuration {
            Some(config) => property_duration(config.as_ref(), COUNTER_CYCLE, DEFAULT_CYCLE)?,
            None => {
                warn!("[DemoPlugin] No configuration service, counter job runs unobserved");
                DEFAULT_CYCLE
            }
        };
        let registry = get_component::<dyn JobRegistry>(components.as_ref())
            .ok_or_else(|| ParticipantError::not_found("job registry"))?;

        registry.add_job(
            COUNTER_JOB,
            Arc::new(CounterJob::new(configuration)),
            JobConfiguration::new(cycle),
        )?;
        info!(
            job = COUNTER_JOB,
            cycle_us = cycle.as_micros() as u64,
            "[DemoPlugin] Job registered"
        );
        *self.registry.lock() = Some(registry);
        Ok(())
    }

    fn deinitialize(&self) -> Result<()> {
        if let Some(registry) = self.registry.lock().take() {
            registry.remove_job(COUNTER_JOB)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use participant_types::{ComponentInterface, InterfaceHandle, JobEntry, JobInfo, PropertyTree};

    #[derive(Default)]
    struct Jobs(Mutex<Vec<JobEntry>>);

    impl Component for Jobs {
        fn iid(&self) -> &str {
            <dyn JobRegistry as ComponentInterface>::IID
        }
    }

    impl JobRegistry for Jobs {
        fn add_job(&self, name: &str, job: Arc<dyn Job>, config: JobConfiguration) -> Result<()> {
            self.0.lock().push(JobEntry::new(job, JobInfo::new(name, config)?));
            Ok(())
        }
        fn remove_job(&self, name: &str) -> Result<()> {
            self.0.lock().retain(|entry| entry.name() != name);
            Ok(())
        }
        fn job_infos(&self) -> Vec<JobInfo> {
            self.0.lock().iter().map(|entry| entry.info.clone()).collect()
        }
        fn jobs(&self) -> Vec<JobEntry> {
            self.0.lock().clone()
        }
        fn reconfigure_job(&self, _name: &str, _config: JobConfiguration) -> Result<()> {
            Ok(())
        }
    }

    struct Lookup {
        config: Arc<PropertyTree>,
        jobs: Arc<Jobs>,
    }

    impl Components for Lookup {
        fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
            let config: Arc<dyn ConfigurationService> = self.config.clone();
            let jobs: Arc<dyn JobRegistry> = self.jobs.clone();
            [InterfaceHandle::new(config), InterfaceHandle::new(jobs)]
                .into_iter()
                .find(|handle| handle.iid() == iid)
        }
    }

    #[test]
    fn test_registers_counter_and_publishes_progress() {
        let lookup = Arc::new(Lookup {
            config: Arc::new(PropertyTree::with_properties([(
                COUNTER_CYCLE,
                PropertyValue::Int(5_000_000),
            )])),
            jobs: Arc::new(Jobs::default()),
        });
        let component = DemoJobsComponent::new();
        component.create(lookup.clone()).unwrap();
        component.initialize().unwrap();

        let entry = lookup.jobs.jobs().remove(0);
        assert_eq!(entry.name(), COUNTER_JOB);
        assert_eq!(entry.info.config().cycle_time, Duration::from_millis(5));

        let t = Timestamp::from_millis(5);
        entry.job.execute(t).unwrap();
        entry.job.execute_data_out(t).unwrap();
        assert_eq!(lookup.config.get_property(COUNTER_VALUE), Some(PropertyValue::Int(1)));
        assert_eq!(
            lookup.config.get_property(COUNTER_LAST_TIME),
            Some(PropertyValue::Int(5_000_000))
        );

        component.deinitialize().unwrap();
        assert!(lookup.jobs.jobs().is_empty());
    }
}
