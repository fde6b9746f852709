//! # Job Runner
//!
//! Runs one job invocation: `execute_data_in`, timed `execute`, then
//! `execute_data_out`. A failing phase is logged and counted; the
//! remaining phases still run.
//!
//! ## Runtime Violations
//!
//! Only `execute` is measured. When it exceeds the job's max runtime:
//!
//! | Strategy | Action |
//! |----------|--------|
//! | ignore | none |
//! | warn | warning log |
//! | skip_output_publish | `execute_data_out` skipped for this invocation |
//! | set_state_to_error | [`ErrorStateNotifier::set_state_to_error`] |

use participant_telemetry::metrics::{
    JOBS_EXECUTED, JOB_EXECUTE_DURATION, JOB_FAILURES, RUNTIME_VIOLATIONS,
};
use participant_telemetry::{log_job_event, time_histogram};
use participant_types::{
    ErrorStateNotifier, JobEntry, Result, TimeViolationStrategy, Timestamp,
};
use std::time::Duration;

/// What happened during one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub time: Timestamp,
    pub execute_duration: Duration,
    pub violated: bool,
    pub output_skipped: bool,
    pub failures: usize,
}

/// A job plus its scheduling state.
pub struct JobRunner {
    entry: JobEntry,
    next_due: Timestamp,
    exhausted: bool,
}

impl JobRunner {
    pub fn new(entry: JobEntry) -> Self {
        Self {
            entry,
            next_due: Timestamp::ZERO,
            exhausted: false,
        }
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn next_due(&self) -> Timestamp {
        self.next_due
    }

    pub fn cycle_time(&self) -> Duration {
        self.entry.info.config().cycle_time
    }

    /// Whether the job has a boundary at or before `time` left to run.
    pub fn is_due(&self, time: Timestamp) -> bool {
        !self.exhausted && self.next_due <= time
    }

    /// True once the next boundary lies past the end of the timeline.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Seed the due time after a reset to `time`.
    pub fn reset(&mut self, time: Timestamp) {
        match time.checked_add(self.entry.info.config().delay_time) {
            Some(due) => {
                self.next_due = due;
                self.exhausted = false;
            }
            None => self.exhaust(time),
        }
    }

    /// Due time for the discrete catch-up loop.
    pub fn advance_one_cycle(&mut self) {
        match self.next_due.checked_add(self.cycle_time()) {
            Some(due) => self.next_due = due,
            None => self.exhaust(self.next_due),
        }
    }

    /// Skip every cycle boundary up to and including `time`.
    pub fn skip_past(&mut self, time: Timestamp) {
        let cycle = self.cycle_time().as_nanos();
        let behind = time
            .duration_since(self.next_due)
            .map_or(0, |behind| behind.as_nanos());
        let cycles = behind / cycle + 1;
        let skip = cycle
            .checked_mul(cycles)
            .and_then(|skip| u64::try_from(skip).ok())
            .and_then(|skip| self.next_due.checked_add(Duration::from_nanos(skip)));
        match skip {
            Some(due) => self.next_due = due,
            None => self.exhaust(time),
        }
    }

    fn exhaust(&mut self, time: Timestamp) {
        self.exhausted = true;
        log_job_event!(warn, "[Scheduler]", "No cycle boundary left before the end of the timeline", self.entry.name(), time);
    }

    pub fn run(&self, time: Timestamp, notifier: Option<&dyn ErrorStateNotifier>) -> RunReport {
        let name = self.entry.name();
        let job = &self.entry.job;
        let config = self.entry.info.config();
        let mut failures = 0;

        failures += self.phase("data_in", time, job.execute_data_in(time));

        let timer = time_histogram!(JOB_EXECUTE_DURATION);
        let outcome = job.execute(time);
        let execute_duration = timer.stop();
        failures += self.phase("execute", time, outcome);

        let mut violated = false;
        let mut output_skipped = false;
        if let Some(limit) = config.checked_max_runtime() {
            if execute_duration > limit {
                violated = true;
                let strategy = config.runtime_violation_strategy;
                RUNTIME_VIOLATIONS
                    .with_label_values(&[name, strategy.as_str()])
                    .inc();
                let elapsed_us = execute_duration.as_micros() as u64;
                let limit_us = limit.as_micros() as u64;
                match strategy {
                    TimeViolationStrategy::Ignore | TimeViolationStrategy::Unknown => {}
                    TimeViolationStrategy::Warn => {
                        log_job_event!(warn, "[Scheduler]", "Max runtime exceeded", name, time, elapsed_us, limit_us);
                    }
                    TimeViolationStrategy::SkipOutputPublish => {
                        output_skipped = true;
                        log_job_event!(warn, "[Scheduler]", "Max runtime exceeded, output not published", name, time, elapsed_us, limit_us);
                    }
                    TimeViolationStrategy::SetStateToError => {
                        log_job_event!(error, "[Scheduler]", "Max runtime exceeded, participant set to error", name, time, elapsed_us, limit_us);
                        if let Some(notifier) = notifier {
                            notifier.set_state_to_error(&format!(
                                "job '{}' exceeded its max runtime of {}us ({}us)",
                                name, limit_us, elapsed_us
                            ));
                        }
                    }
                }
            }
        }

        if !output_skipped {
            failures += self.phase("data_out", time, job.execute_data_out(time));
        }

        JOBS_EXECUTED.with_label_values(&[name]).inc();
        RunReport {
            time,
            execute_duration,
            violated,
            output_skipped,
            failures,
        }
    }

    fn phase(&self, phase: &str, time: Timestamp, outcome: Result<()>) -> usize {
        match outcome {
            Ok(()) => 0,
            Err(e) => {
                let name = self.entry.name();
                JOB_FAILURES.with_label_values(&[name, phase]).inc();
                log_job_event!(error, "[Scheduler]", "Job phase failed", name, time, phase, error = %e);
                1
            }
        }
    }
}
