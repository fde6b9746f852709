//! # Scheduler Crate
//!
//! Runs the participant's jobs in step with the main clock.
//!
//! - [`ClockBasedScheduler`]: the built-in scheduler. Discrete time catches
//!   up on every missed cycle; continuous time skips ahead.
//! - [`JobRunner`]: one job's due time and its data-in, execute, data-out
//!   phases under the configured runtime violation strategy.
//! - [`SchedulerServiceComponent`]: the component that holds schedulers and
//!   feeds the active one from the job registry.

pub mod clock_based;
pub mod runner;
pub mod service;

pub use clock_based::ClockBasedScheduler;
pub use runner::{JobRunner, RunReport};
pub use service::SchedulerServiceComponent;
