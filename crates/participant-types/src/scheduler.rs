//! # Scheduler Interfaces
//!
//! A [`Scheduler`] executes a snapshot of jobs driven by the clock service.
//! The [`SchedulerService`] holds the available schedulers and hands the
//! active one its jobs at `tense`.

use crate::clock::ClockService;
use crate::component::{Component, ComponentInterface};
use crate::errors::Result;
use crate::job::JobEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the built-in clock based scheduler.
pub const CLOCK_BASED_SCHEDULER: &str = "clock_based_scheduler";

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

/// Executes jobs in step with a clock.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> String;

    /// Store the clock service and the job snapshot.
    fn initialize(&self, clock_service: Arc<dyn ClockService>, jobs: Vec<JobEntry>) -> Result<()>;

    /// Begin dispatching clock events to jobs.
    fn start(&self) -> Result<()>;

    /// Stop dispatching. An in-flight job completes.
    fn stop(&self) -> Result<()>;

    /// Release the job snapshot. Fails with `invalid_state` while started.
    fn deinitialize(&self) -> Result<()>;

    fn state(&self) -> SchedulerState;
}

/// Hook a scheduler uses to put its participant into the error state.
pub trait ErrorStateNotifier: Send + Sync {
    fn set_state_to_error(&self, reason: &str);
}

/// Holder of the participant's schedulers.
pub trait SchedulerService: Component {
    /// Name of the scheduler that runs the jobs.
    fn active_scheduler(&self) -> String;

    /// All registered scheduler names, sorted.
    fn scheduler_names(&self) -> Vec<String>;

    /// Fails with `resource_in_use` for a duplicate name.
    fn register_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> Result<()>;

    /// Fails with `not_found` for an unknown name, `invalid_state` for the
    /// active scheduler while it is running.
    fn unregister_scheduler(&self, name: &str) -> Result<()>;
}

impl ComponentInterface for dyn SchedulerService {
    const IID: &'static str = "scheduler_service.arya.participant.iid";
}
