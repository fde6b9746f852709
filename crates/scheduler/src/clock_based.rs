//! # Clock Based Scheduler
//!
//! Registers itself as an event sink of the clock service and runs the jobs
//! of a snapshot taken at `initialize`.
//!
//! ```text
//! Uninitialized ─initialize─▶ Initialized ─start─▶ Started ⇄ Stopped
//!       ▲                                                      │
//!       └──────────────────────deinitialize────────────────────┘
//! ```
//!
//! ## Dispatch
//!
//! - **Reset to T**: every job becomes due at `T + delay`. No job runs.
//! - **Discrete update to t**: every due job runs once per cycle boundary
//!   up to `t`, at the boundary's time. Across jobs, runs are ordered by due
//!   time, then registration order.
//! - **Continuous update to t**: every due job runs once, at `t`; missed
//!   boundaries are skipped.
//!
//! The clock type is read from the clock service at each reset.

use crate::runner::{JobRunner, RunReport};
use parking_lot::Mutex;
use participant_types::{
    ClockService, ClockType, ErrorStateNotifier, EventSink, JobEntry, ParticipantError, Result,
    Scheduler, SchedulerState, Timestamp, CLOCK_BASED_SCHEDULER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct SchedulerCore {
    state: Mutex<SchedulerState>,
    clock_service: Mutex<Option<Arc<dyn ClockService>>>,
    runners: Mutex<Vec<JobRunner>>,
    mode: Mutex<ClockType>,
    dispatching: AtomicBool,
    notifier: Option<Arc<dyn ErrorStateNotifier>>,
    observer: Mutex<Option<Box<dyn Fn(&str, &RunReport) + Send + Sync>>>,
}

impl SchedulerCore {
    fn run(&self, runner: &JobRunner, time: Timestamp) {
        let report = runner.run(time, self.notifier.as_deref());
        if let Some(observer) = self.observer.lock().as_ref() {
            observer(runner.name(), &report);
        }
    }

    fn dispatch_discrete(&self, runners: &mut [JobRunner], time: Timestamp) {
        while self.dispatching.load(Ordering::SeqCst) {
            let next = runners
                .iter()
                .enumerate()
                .filter(|(_, runner)| runner.is_due(time))
                .min_by_key(|(index, runner)| (runner.next_due(), *index))
                .map(|(index, _)| index);
            let Some(index) = next else {
                break;
            };
            let due = runners[index].next_due();
            self.run(&runners[index], due);
            runners[index].advance_one_cycle();
        }
    }

    fn dispatch_continuous(&self, runners: &mut [JobRunner], time: Timestamp) {
        for runner in runners.iter_mut() {
            if !self.dispatching.load(Ordering::SeqCst) {
                break;
            }
            if runner.is_due(time) {
                self.run(runner, time);
                runner.skip_past(time);
            }
        }
    }
}

impl EventSink for SchedulerCore {
    fn time_update_begin(&self, _old_time: Timestamp, _new_time: Timestamp) {}

    fn time_updating(&self, new_time: Timestamp) {
        if !self.dispatching.load(Ordering::SeqCst) {
            return;
        }
        let mode = *self.mode.lock();
        let mut runners = self.runners.lock();
        match mode {
            ClockType::Discrete => self.dispatch_discrete(&mut runners, new_time),
            ClockType::Continuous => self.dispatch_continuous(&mut runners, new_time),
        }
    }

    fn time_update_end(&self, _new_time: Timestamp) {}

    fn time_reset_begin(&self, _old_time: Timestamp, _new_time: Timestamp) {
        let clock_service = self.clock_service.lock().clone();
        if let Some(clock_service) = clock_service {
            *self.mode.lock() = clock_service.clock_type();
        }
    }

    fn time_reset_end(&self, new_time: Timestamp) {
        let mut runners = self.runners.lock();
        for runner in runners.iter_mut() {
            runner.reset(new_time);
        }
        debug!(
            time = %new_time,
            mode = %*self.mode.lock(),
            jobs = runners.len(),
            "[Scheduler] Jobs reset"
        );
    }
}

/// The built-in scheduler.
pub struct ClockBasedScheduler {
    core: Arc<SchedulerCore>,
}

impl ClockBasedScheduler {
    pub fn new() -> Self {
        Self::with_notifier(None)
    }

    pub fn with_notifier(notifier: Option<Arc<dyn ErrorStateNotifier>>) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                state: Mutex::new(SchedulerState::Uninitialized),
                clock_service: Mutex::new(None),
                runners: Mutex::new(Vec::new()),
                mode: Mutex::new(ClockType::Continuous),
                dispatching: AtomicBool::new(false),
                notifier,
                observer: Mutex::new(None),
            }),
        }
    }

    /// Called after every job invocation with the job name and its report.
    pub fn set_observer(&self, observer: impl Fn(&str, &RunReport) + Send + Sync + 'static) {
        *self.core.observer.lock() = Some(Box::new(observer));
    }

    /// The event sink the scheduler registers with the clock service.
    pub fn event_sink(&self) -> Weak<dyn EventSink> {
        Arc::downgrade(&self.core) as Weak<dyn EventSink>
    }

    pub fn job_names(&self) -> Vec<String> {
        self.core
            .runners
            .lock()
            .iter()
            .map(|runner| runner.name().to_string())
            .collect()
    }

    fn transition_error(&self, operation: &str, state: SchedulerState) -> ParticipantError {
        warn!(operation, ?state, "[Scheduler] Transition not allowed");
        ParticipantError::invalid_state(format!(
            "cannot {} scheduler in state {:?}",
            operation, state
        ))
    }
}

impl Default for ClockBasedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ClockBasedScheduler {
    fn name(&self) -> String {
        CLOCK_BASED_SCHEDULER.to_string()
    }

    fn initialize(&self, clock_service: Arc<dyn ClockService>, jobs: Vec<JobEntry>) -> Result<()> {
        let mut state = self.core.state.lock();
        if !matches!(*state, SchedulerState::Uninitialized | SchedulerState::Initialized) {
            return Err(self.transition_error("initialize", *state));
        }
        info!(jobs = jobs.len(), "[Scheduler] Initializing with job snapshot");
        *self.core.mode.lock() = clock_service.clock_type();
        *self.core.clock_service.lock() = Some(clock_service);
        *self.core.runners.lock() = jobs.into_iter().map(JobRunner::new).collect();
        *state = SchedulerState::Initialized;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.core.state.lock();
        if !matches!(*state, SchedulerState::Initialized | SchedulerState::Stopped) {
            return Err(self.transition_error("start", *state));
        }
        let clock_service = self
            .core
            .clock_service
            .lock()
            .clone()
            .ok_or_else(|| ParticipantError::invalid_state("scheduler has no clock service"))?;

        self.core.dispatching.store(true, Ordering::SeqCst);
        if let Err(e) = clock_service.register_event_sink(self.event_sink()) {
            self.core.dispatching.store(false, Ordering::SeqCst);
            return Err(e);
        }
        *state = SchedulerState::Started;
        info!("[Scheduler] Started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.core.state.lock();
        if *state != SchedulerState::Started {
            return Ok(());
        }
        self.core.dispatching.store(false, Ordering::SeqCst);
        let clock_service = self.core.clock_service.lock().clone();
        if let Some(clock_service) = clock_service {
            if let Err(e) = clock_service.unregister_event_sink(&self.event_sink()) {
                debug!(error = %e, "[Scheduler] Event sink was already gone");
            }
        }
        *state = SchedulerState::Stopped;
        info!("[Scheduler] Stopped");
        Ok(())
    }

    fn deinitialize(&self) -> Result<()> {
        let mut state = self.core.state.lock();
        if *state == SchedulerState::Started {
            return Err(self.transition_error("deinitialize", *state));
        }
        self.core.runners.lock().clear();
        self.core.clock_service.lock().take();
        *state = SchedulerState::Uninitialized;
        Ok(())
    }

    fn state(&self) -> SchedulerState {
        *self.core.state.lock()
    }
}
