//! # Participant
//!
//! One participant: its native components, the components of its components
//! file, and the state machine the outside world drives it with.
//!
//! ```text
//! Unloaded ─load─▶ Loaded ─initialize─▶ Initialized ─start─▶ Running
//!    ▲               │  ▲                 │   ▲               │  ▲
//!    └────unload─────┘  └──deinitialize───┘   └─────stop──────┘  │
//!                                             Paused ◀─pause─────┘
//!                                               └──────start─────┘
//! any state ─job failure─▶ Error ─shutdown─▶ Unloaded
//! ```
//!
//! | Participant transition | Component lifecycle |
//! |------------------------|---------------------|
//! | `load` | register, `create` |
//! | `initialize` | `initialize`, `tense` |
//! | `start` | `start` |
//! | `stop` / `pause` | `stop` |
//! | `deinitialize` | `relax`, `deinitialize` |
//! | `unload` | `destroy`, plugins unloaded |
//!
//! Native components are registered in dependency order: configuration
//! service, job registry, scheduler service, clock service. The scheduler
//! therefore tenses and starts before the main clock does.

use crate::config::ParticipantConfig;
use clock_service::ClockServiceComponent;
use component_registry::{ComponentRegistry, ComponentSource, ComponentsFile, LifecycleState};
use job_registry::{
    reconfigure_jobs_from_timing, JobRegistryComponent, JobRegistryRpc, TimingConfiguration,
};
use parking_lot::Mutex;
use participant_types::{
    ClockService, ConfigurationService, ErrorStateNotifier, InterfaceHandle, JobRegistry,
    ParticipantError, PropertyTree, Result, SchedulerService,
};
use scheduler::SchedulerServiceComponent;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Externally visible participant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Unloaded,
    Loaded,
    Initialized,
    Running,
    Paused,
    Error,
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Shared with the scheduler, which may flip it to `Error` from a clock thread.
struct StateCell {
    participant: String,
    state: Mutex<ParticipantState>,
    reason: Mutex<Option<String>>,
}

impl StateCell {
    fn get(&self) -> ParticipantState {
        *self.state.lock()
    }

    /// Move to `to` unless an error was raised in the meantime.
    fn advance(&self, to: ParticipantState) -> bool {
        let mut state = self.state.lock();
        if *state == ParticipantState::Error {
            return false;
        }
        *state = to;
        true
    }

    fn force(&self, to: ParticipantState) {
        *self.state.lock() = to;
        if to != ParticipantState::Error {
            self.reason.lock().take();
        }
    }
}

impl ErrorStateNotifier for StateCell {
    fn set_state_to_error(&self, reason: &str) {
        error!(participant = %self.participant, reason, "[Participant] Entering error state");
        *self.state.lock() = ParticipantState::Error;
        *self.reason.lock() = Some(reason.to_string());
    }
}

type NativeComponentFactory = Box<dyn Fn(&str) -> Option<InterfaceHandle> + Send + Sync>;

pub struct Participant {
    config: ParticipantConfig,
    registry: ComponentRegistry,
    state: Arc<StateCell>,
    configuration: Arc<PropertyTree>,
    job_registry: Arc<JobRegistryComponent>,
    scheduler_service: Arc<SchedulerServiceComponent>,
    clock_service: Arc<ClockServiceComponent>,
    native_factory: Option<NativeComponentFactory>,
}

impl Participant {
    pub fn new(config: ParticipantConfig) -> Self {
        let state = Arc::new(StateCell {
            participant: config.name.clone(),
            state: Mutex::new(ParticipantState::Unloaded),
            reason: Mutex::new(None),
        });
        let notifier: Arc<dyn ErrorStateNotifier> = state.clone();
        Self {
            configuration: Arc::new(PropertyTree::with_properties(config.to_properties())),
            job_registry: Arc::new(JobRegistryComponent::new()),
            scheduler_service: Arc::new(SchedulerServiceComponent::new(Some(notifier))),
            clock_service: Arc::new(ClockServiceComponent::new()),
            registry: ComponentRegistry::new(),
            native_factory: None,
            state,
            config,
        }
    }

    /// Resolves `native` entries of the components file.
    #[must_use]
    pub fn with_native_factory(
        mut self,
        factory: impl Fn(&str) -> Option<InterfaceHandle> + Send + Sync + 'static,
    ) -> Self {
        self.native_factory = Some(Box::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ParticipantState {
        self.state.get()
    }

    /// Why the participant entered the error state.
    pub fn error_reason(&self) -> Option<String> {
        self.state.reason.lock().clone()
    }

    pub fn configuration(&self) -> Arc<dyn ConfigurationService> {
        self.configuration.clone()
    }

    pub fn job_registry(&self) -> Arc<dyn JobRegistry> {
        self.job_registry.clone()
    }

    pub fn job_registry_rpc(&self) -> JobRegistryRpc {
        JobRegistryRpc::new(self.job_registry())
    }

    pub fn scheduler_service(&self) -> Arc<dyn SchedulerService> {
        self.scheduler_service.clone()
    }

    /// The native clock service, including its externally steppable clock.
    pub fn clock_service(&self) -> Arc<ClockServiceComponent> {
        self.clock_service.clone()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
        self.registry.find_component(iid)
    }

    /// The hook the scheduler reports job failures through.
    pub fn error_notifier(&self) -> Arc<dyn ErrorStateNotifier> {
        self.state.clone()
    }

    pub fn load(&mut self) -> Result<()> {
        self.expect(&[ParticipantState::Unloaded], "load")?;
        info!(participant = %self.config.name, "[Participant] Loading components");

        if let Err(e) = self.register_components() {
            error!(participant = %self.config.name, error = %e, "[Participant] Load failed");
            if let Err(clear) = self.registry.clear() {
                warn!(error = %clear, "[Participant] Could not clear registry");
            }
            return Err(e);
        }
        if let Err(e) = self.registry.create() {
            error!(participant = %self.config.name, error = %e, "[Participant] Create failed");
            self.registry.clear()?;
            return Err(e);
        }

        self.state.advance(ParticipantState::Loaded);
        info!(
            participant = %self.config.name,
            components = self.registry.len(),
            plugins = self.registry.plugin_count(),
            "[Participant] Loaded"
        );
        Ok(())
    }

    fn register_components(&mut self) -> Result<()> {
        let configuration: Arc<dyn ConfigurationService> = self.configuration.clone();
        let jobs: Arc<dyn JobRegistry> = self.job_registry.clone();
        let schedulers: Arc<dyn SchedulerService> = self.scheduler_service.clone();
        let clocks: Arc<dyn ClockService> = self.clock_service.clone();
        for handle in [
            InterfaceHandle::new(configuration),
            InterfaceHandle::new(jobs),
            InterfaceHandle::new(schedulers),
            InterfaceHandle::new(clocks),
        ] {
            self.registry.add_component(handle, ComponentSource::Native)?;
        }

        if let Some(path) = &self.config.components_file {
            let file = ComponentsFile::read(path)?;
            let native_factory = &self.native_factory;
            let native = |iid: &str| native_factory.as_ref().and_then(|factory| factory(iid));
            self.registry.load_components_file(&file, &native)?;
        }
        Ok(())
    }

    /// Reconfigure registered jobs from a timing file, using this
    /// participant's entry. Only while loaded: the job set is frozen from
    /// `initialize` on.
    pub fn apply_timing_configuration(&self, path: impl AsRef<Path>) -> Result<()> {
        self.expect(&[ParticipantState::Loaded], "apply timing configuration")?;
        let path = path.as_ref();
        let timing = TimingConfiguration::read(path)?;
        reconfigure_jobs_from_timing(self.job_registry.as_ref(), &timing, &self.config.name)?;
        info!(
            participant = %self.config.name,
            path = %path.display(),
            "[Participant] Timing configuration applied"
        );
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.expect(&[ParticipantState::Loaded], "initialize")?;
        if let Some(path) = self.config.timing_file.clone() {
            self.apply_timing_configuration(path)?;
        }

        self.registry.initialize()?;
        if let Err(e) = self.registry.tense() {
            error!(participant = %self.config.name, error = %e, "[Participant] Tense failed");
            if let Err(rollback) = self.registry.deinitialize() {
                warn!(error = %rollback, "[Participant] Rollback after tense failed");
            }
            return Err(e);
        }
        self.state.advance(ParticipantState::Initialized);
        info!(participant = %self.config.name, "[Participant] Initialized");
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect(
            &[ParticipantState::Initialized, ParticipantState::Paused],
            "start",
        )?;
        if let Err(e) = self.registry.start() {
            self.state.set_state_to_error(&format!("start failed: {}", e));
            return Err(e);
        }
        if self.state.advance(ParticipantState::Running) {
            info!(participant = %self.config.name, "[Participant] Running");
        }
        Ok(())
    }

    /// Stop running components and keep the job snapshot.
    pub fn pause(&mut self) -> Result<()> {
        self.expect(&[ParticipantState::Running], "pause")?;
        self.registry.stop()?;
        if self.state.advance(ParticipantState::Paused) {
            info!(participant = %self.config.name, "[Participant] Paused");
        }
        Ok(())
    }

    /// Stop running components. From `Error` the participant stays in `Error`.
    pub fn stop(&mut self) -> Result<()> {
        self.expect(
            &[
                ParticipantState::Running,
                ParticipantState::Paused,
                ParticipantState::Error,
            ],
            "stop",
        )?;
        let outcome = if self.registry.state() == LifecycleState::Started {
            self.registry.stop()
        } else {
            Ok(())
        };
        if self.state.advance(ParticipantState::Initialized) {
            info!(participant = %self.config.name, "[Participant] Stopped");
        }
        outcome
    }

    pub fn deinitialize(&mut self) -> Result<()> {
        self.expect(&[ParticipantState::Initialized], "deinitialize")?;
        let relaxed = self.registry.relax();
        let deinitialized = self.registry.deinitialize();
        self.state.advance(ParticipantState::Loaded);
        relaxed.and(deinitialized)
    }

    pub fn unload(&mut self) -> Result<()> {
        self.expect(&[ParticipantState::Loaded], "unload")?;
        let destroyed = self.registry.destroy();
        self.registry.clear()?;
        self.state.advance(ParticipantState::Unloaded);
        info!(participant = %self.config.name, "[Participant] Unloaded");
        destroyed
    }

    /// Walk the components back to unloaded from whatever state they are
    /// in, including after an error. Returns the first failure.
    pub fn shutdown(&mut self) -> Result<()> {
        info!(
            participant = %self.config.name,
            state = %self.state(),
            "[Participant] Shutting down"
        );
        let mut first_error = None;
        loop {
            let step = match self.registry.state() {
                LifecycleState::Started => self.registry.stop(),
                LifecycleState::Tensed => self.registry.relax(),
                LifecycleState::Initialized => self.registry.deinitialize(),
                LifecycleState::Created => self.registry.destroy(),
                LifecycleState::Constructed => break,
            };
            if let Err(e) = step {
                warn!(error = %e, "[Participant] Shutdown step failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.registry.clear() {
            first_error.get_or_insert(e);
        }
        self.state.force(ParticipantState::Unloaded);
        first_error.map_or(Ok(()), Err)
    }

    fn expect(&self, allowed: &[ParticipantState], operation: &str) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            return Ok(());
        }
        warn!(
            participant = %self.config.name,
            operation,
            %state,
            "[Participant] Transition not allowed"
        );
        Err(ParticipantError::invalid_state(format!(
            "cannot {} participant '{}' in state {}",
            operation, self.config.name, state
        )))
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        if self.registry.state() != LifecycleState::Constructed || !self.registry.is_empty() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "[Participant] Shutdown on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use participant_types::{
        ErrorCode, Job, JobConfiguration, PropertyValue, TimeViolationStrategy, Timestamp,
        LOCAL_SYSTEM_SIMTIME,
    };
    use std::io::Write;
    use std::time::Duration;

    #[derive(Default)]
    struct Times(Mutex<Vec<i64>>);

    impl Job for Times {
        fn execute(&self, time: Timestamp) -> Result<()> {
            self.0.lock().push(time.as_millis());
            Ok(())
        }
    }

    struct Failing;

    impl Job for Failing {
        fn execute(&self, _time: Timestamp) -> Result<()> {
            std::thread::sleep(Duration::from_millis(3));
            Ok(())
        }
    }

    fn simtime_config(name: &str) -> ParticipantConfig {
        ParticipantConfig {
            name: name.to_string(),
            main_clock: LOCAL_SYSTEM_SIMTIME.to_string(),
            step_size: Duration::from_millis(10),
            ..ParticipantConfig::default()
        }
        .with_property("clock/discrete_drive", "external")
    }

    #[test]
    fn test_full_lifecycle_with_external_clock() {
        let mut participant = Participant::new(simtime_config("p1"));
        participant.load().unwrap();
        assert_eq!(participant.state(), ParticipantState::Loaded);
        assert_eq!(participant.registry().len(), 4);

        let job = Arc::new(Times::default());
        participant
            .job_registry()
            .add_job("sample", job.clone(), JobConfiguration::new(Duration::from_millis(20)))
            .unwrap();

        participant.initialize().unwrap();
        participant.start().unwrap();
        assert_eq!(participant.state(), ParticipantState::Running);

        let simtime = participant.clock_service().simtime_clock();
        for _ in 0..4 {
            simtime.step().unwrap();
        }
        assert_eq!(*job.0.lock(), vec![0, 20, 40]);

        participant.pause().unwrap();
        assert_eq!(participant.state(), ParticipantState::Paused);
        participant.start().unwrap();
        simtime.step().unwrap();
        assert_eq!(*job.0.lock(), vec![0, 20, 40, 0]);

        participant.stop().unwrap();
        participant.deinitialize().unwrap();
        participant.unload().unwrap();
        assert_eq!(participant.state(), ParticipantState::Unloaded);
        assert!(participant.registry().is_empty());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut participant = Participant::new(ParticipantConfig::default());
        assert_eq!(participant.start().unwrap_err().code, ErrorCode::InvalidState);
        participant.load().unwrap();
        assert_eq!(participant.load().unwrap_err().code, ErrorCode::InvalidState);
        assert_eq!(participant.pause().unwrap_err().code, ErrorCode::InvalidState);
        participant.unload().unwrap();
    }

    #[test]
    fn test_runtime_violation_moves_to_error() {
        let mut participant = Participant::new(simtime_config("p2"));
        participant.load().unwrap();
        let config = JobConfiguration::new(Duration::from_millis(10))
            .with_max_runtime(Duration::from_millis(1), TimeViolationStrategy::SetStateToError);
        participant
            .job_registry()
            .add_job("slow", Arc::new(Failing), config)
            .unwrap();
        participant.initialize().unwrap();
        participant.start().unwrap();

        participant.clock_service().simtime_clock().step().unwrap();
        assert_eq!(participant.state(), ParticipantState::Error);
        assert!(participant.error_reason().unwrap().contains("slow"));
        assert_eq!(participant.deinitialize().unwrap_err().code, ErrorCode::InvalidState);

        participant.stop().unwrap();
        assert_eq!(participant.state(), ParticipantState::Error);
        participant.shutdown().unwrap();
        assert_eq!(participant.state(), ParticipantState::Unloaded);
        assert!(participant.error_reason().is_none());
    }

    #[test]
    fn test_unknown_main_clock_fails_initialize() {
        let config = ParticipantConfig {
            main_clock: "no_such_clock".to_string(),
            ..ParticipantConfig::default()
        };
        let mut participant = Participant::new(config);
        participant.load().unwrap();
        let err = participant.initialize().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(participant.state(), ParticipantState::Loaded);
        assert_eq!(participant.registry().state(), LifecycleState::Created);
    }

    #[test]
    fn test_timing_file_reconfigures_jobs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<timing>
  <schema_version>1.0</schema_version>
  <header><author>ci</author><date_creation>today</date_creation><date_change>today</date_change><description>t</description></header>
  <participants>
    <participant>
      <name>p3</name>
      <jobs>
        <job>
          <name>sample</name>
          <cycle_time>50000</cycle_time>
          <cycle_delay_time>5000</cycle_delay_time>
          <max_run_realtime>0</max_run_realtime>
          <run_realtime_violation>ignore_runtime_violation</run_realtime_violation>
        </job>
      </jobs>
    </participant>
  </participants>
</timing>"#
        )
        .unwrap();

        let mut config = simtime_config("p3");
        config.timing_file = Some(file.path().to_path_buf());
        let mut participant = Participant::new(config);
        participant.load().unwrap();
        participant
            .job_registry()
            .add_job(
                "sample",
                Arc::new(Times::default()),
                JobConfiguration::new(Duration::from_millis(10)),
            )
            .unwrap();
        participant.initialize().unwrap();

        let info = participant.job_registry().job_infos().remove(0);
        assert_eq!(info.config().cycle_time, Duration::from_millis(50));
        assert_eq!(info.config().delay_time, Duration::from_millis(5));
        assert_eq!(
            participant
                .configuration()
                .get_property("clock/main_clock"),
            Some(PropertyValue::from(LOCAL_SYSTEM_SIMTIME))
        );
    }
}
