//! # Local System Simtime Clock
//!
//! Discrete clock advancing in fixed steps. Steps come from its own timer
//! thread, paced by `time_factor` against wall time, or from an external
//! driver calling [`LocalSystemSimtimeClock::step`].
//!
//! | time_factor | pacing |
//! |-------------|--------|
//! | `1.0` | one step size of wall time per step |
//! | `2.0` | twice as fast as wall time |
//! | `0.0` | as fast as possible |

use crate::sinks::SinkSlot;
use crate::timer::{sleep_until, ClockThread};
use parking_lot::Mutex;
use participant_types::{
    Clock, ClockType, EventSink, ParticipantError, Result, Timestamp, LOCAL_SYSTEM_SIMTIME,
};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_STEP_SIZE: Duration = Duration::from_millis(100);
pub const DEFAULT_TIME_FACTOR: f64 = 1.0;

/// Who advances the discrete clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscreteDrive {
    Timer,
    External,
}

impl FromStr for DiscreteDrive {
    type Err = ParticipantError;

    fn from_str(text: &str) -> Result<Self> {
        match text.trim() {
            "timer" => Ok(Self::Timer),
            "external" => Ok(Self::External),
            other => Err(ParticipantError::invalid_argument(format!(
                "discrete_drive: expected 'timer' or 'external', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DiscreteDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer => f.write_str("timer"),
            Self::External => f.write_str("external"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimtimeSettings {
    pub step_size: Duration,
    pub time_factor: f64,
    pub drive: DiscreteDrive,
}

impl Default for SimtimeSettings {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            time_factor: DEFAULT_TIME_FACTOR,
            drive: DiscreteDrive::Timer,
        }
    }
}

impl SimtimeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.step_size.is_zero() {
            return Err(ParticipantError::invalid_argument(
                "step_size: must be greater than 0",
            ));
        }
        if !self.time_factor.is_finite() || self.time_factor < 0.0 {
            return Err(ParticipantError::invalid_argument(format!(
                "time_factor: must be >= 0, got {}",
                self.time_factor
            )));
        }
        Ok(())
    }

    /// Wall time between two timer steps.
    fn pacing(&self) -> Duration {
        if self.time_factor == 0.0 {
            Duration::ZERO
        } else {
            self.step_size.div_f64(self.time_factor)
        }
    }
}

#[derive(Default)]
struct StepState {
    time: Mutex<Timestamp>,
    running: AtomicBool,
    sink: SinkSlot,
}

impl StepState {
    fn advance(&self, step: Duration) -> Timestamp {
        let (old, new) = {
            let mut time = self.time.lock();
            let old = *time;
            *time = old + step;
            (old, *time)
        };
        self.sink.emit_update(old, new);
        new
    }

    fn jump(&self, new: Timestamp) -> Result<()> {
        let old = {
            let mut time = self.time.lock();
            if new < *time {
                return Err(ParticipantError::invalid_argument(format!(
                    "cannot step back from {} to {}",
                    *time, new
                )));
            }
            std::mem::replace(&mut *time, new)
        };
        self.sink.emit_update(old, new);
        Ok(())
    }
}

pub struct LocalSystemSimtimeClock {
    settings: Mutex<SimtimeSettings>,
    state: Arc<StepState>,
    thread: Mutex<Option<ClockThread>>,
}

impl LocalSystemSimtimeClock {
    pub fn new() -> Self {
        Self::with_settings(SimtimeSettings::default())
    }

    pub fn with_settings(settings: SimtimeSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            state: Arc::new(StepState::default()),
            thread: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> SimtimeSettings {
        *self.settings.lock()
    }

    /// Replace the settings. Rejected while running.
    pub fn configure(&self, settings: SimtimeSettings) -> Result<()> {
        settings.validate()?;
        if self.is_running() {
            return Err(ParticipantError::invalid_state(
                "cannot configure a running clock",
            ));
        }
        *self.settings.lock() = settings;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Advance by one step size. Only while running.
    pub fn step(&self) -> Result<Timestamp> {
        self.ensure_running()?;
        Ok(self.state.advance(self.settings.lock().step_size))
    }

    /// Advance straight to `time` with a single update.
    pub fn step_to(&self, time: Timestamp) -> Result<()> {
        self.ensure_running()?;
        self.state.jump(time)
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(ParticipantError::invalid_state(format!(
                "clock '{}' is not running",
                LOCAL_SYSTEM_SIMTIME
            )));
        }
        Ok(())
    }
}

impl Default for LocalSystemSimtimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for LocalSystemSimtimeClock {
    fn name(&self) -> String {
        LOCAL_SYSTEM_SIMTIME.to_string()
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Discrete
    }

    fn time(&self) -> Timestamp {
        *self.state.time.lock()
    }

    fn reset(&self, new_time: Timestamp) {
        let old = std::mem::replace(&mut *self.state.time.lock(), new_time);
        if self.is_running() {
            self.state.sink.emit_reset(old, new_time);
        }
    }

    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Err(ParticipantError::invalid_state(format!(
                "clock '{}' is already running",
                LOCAL_SYSTEM_SIMTIME
            )));
        }

        self.state.sink.set(event_sink);
        let old = std::mem::replace(&mut *self.state.time.lock(), Timestamp::ZERO);
        self.state.sink.emit_reset(old, Timestamp::ZERO);

        let settings = *self.settings.lock();
        if settings.drive == DiscreteDrive::Timer {
            let state = Arc::clone(&self.state);
            let pacing = settings.pacing();
            let step = settings.step_size;
            let thread = ClockThread::spawn(LOCAL_SYSTEM_SIMTIME, move |stop: Arc<AtomicBool>| {
                let mut deadline = Instant::now();
                loop {
                    deadline += pacing;
                    if !sleep_until(deadline, &stop) {
                        break;
                    }
                    state.advance(step);
                }
            });
            match thread {
                Ok(thread) => *self.thread.lock() = Some(thread),
                Err(e) => {
                    self.state.running.store(false, Ordering::SeqCst);
                    self.state.sink.clear();
                    return Err(e);
                }
            }
        }

        info!(
            clock = LOCAL_SYSTEM_SIMTIME,
            step_size_us = settings.step_size.as_micros() as u64,
            time_factor = settings.time_factor,
            drive = %settings.drive,
            "[ClockService] Clock started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            thread.stop();
        }
        self.state.sink.clear();
        debug!(clock = LOCAL_SYSTEM_SIMTIME, time = %self.time(), "[ClockService] Clock stopped");
        Ok(())
    }
}

impl Drop for LocalSystemSimtimeClock {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.lock().take() {
            thread.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use participant_types::ClockEvent;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ClockEvent>>);

    impl EventSink for Recorder {
        fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
            self.0.lock().push(ClockEvent::UpdateBegin { old: old_time, new: new_time });
        }
        fn time_updating(&self, new_time: Timestamp) {
            self.0.lock().push(ClockEvent::Updating { new: new_time });
        }
        fn time_update_end(&self, new_time: Timestamp) {
            self.0.lock().push(ClockEvent::UpdateEnd { new: new_time });
        }
        fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
            self.0.lock().push(ClockEvent::ResetBegin { old: old_time, new: new_time });
        }
        fn time_reset_end(&self, new_time: Timestamp) {
            self.0.lock().push(ClockEvent::ResetEnd { new: new_time });
        }
    }

    fn external(step_ms: u64) -> LocalSystemSimtimeClock {
        LocalSystemSimtimeClock::with_settings(SimtimeSettings {
            step_size: Duration::from_millis(step_ms),
            time_factor: 0.0,
            drive: DiscreteDrive::External,
        })
    }

    #[test]
    fn test_external_steps() {
        let clock = external(10);
        let recorder = Arc::new(Recorder::default());
        assert!(clock.step().is_err());

        clock.start(Arc::downgrade(&recorder) as Weak<dyn EventSink>).unwrap();
        assert_eq!(clock.step().unwrap(), Timestamp::from_millis(10));
        assert_eq!(clock.step().unwrap(), Timestamp::from_millis(20));
        clock.step_to(Timestamp::from_millis(50)).unwrap();
        assert!(clock.step_to(Timestamp::from_millis(40)).is_err());
        clock.stop().unwrap();

        let events = recorder.0.lock().clone();
        assert_eq!(events.len(), 2 + 3 * 3);
        assert_eq!(
            events[2],
            ClockEvent::UpdateBegin { old: Timestamp::ZERO, new: Timestamp::from_millis(10) }
        );
        assert_eq!(events[9], ClockEvent::Updating { new: Timestamp::from_millis(50) });
        assert_eq!(clock.time(), Timestamp::from_millis(50));
    }

    #[test]
    fn test_restart_resets_to_zero() {
        let clock = external(10);
        let recorder = Arc::new(Recorder::default());
        let sink = Arc::downgrade(&recorder) as Weak<dyn EventSink>;
        clock.start(sink.clone()).unwrap();
        clock.step().unwrap();
        clock.stop().unwrap();

        recorder.0.lock().clear();
        clock.start(sink).unwrap();
        assert_eq!(
            *recorder.0.lock(),
            vec![
                ClockEvent::ResetBegin { old: Timestamp::from_millis(10), new: Timestamp::ZERO },
                ClockEvent::ResetEnd { new: Timestamp::ZERO },
            ]
        );
        assert_eq!(clock.time(), Timestamp::ZERO);
        clock.stop().unwrap();
    }

    #[test]
    fn test_timer_drive_advances() {
        let clock = LocalSystemSimtimeClock::with_settings(SimtimeSettings {
            step_size: Duration::from_millis(1),
            time_factor: 0.0,
            drive: DiscreteDrive::Timer,
        });
        let recorder = Arc::new(Recorder::default());
        clock.start(Arc::downgrade(&recorder) as Weak<dyn EventSink>).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.time() < Timestamp::from_millis(20) && Instant::now() < deadline {
            std::thread::yield_now();
        }
        clock.stop().unwrap();
        let stopped = clock.time();
        assert!(stopped >= Timestamp::from_millis(20));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.time(), stopped);
    }

    #[test]
    fn test_settings_validation() {
        let clock = LocalSystemSimtimeClock::new();
        let mut settings = clock.settings();
        settings.step_size = Duration::ZERO;
        assert!(clock.configure(settings).is_err());
        settings.step_size = Duration::from_millis(5);
        settings.time_factor = -1.0;
        assert!(clock.configure(settings).is_err());
        settings.time_factor = 2.0;
        clock.configure(settings).unwrap();
        let pacing = clock.settings().pacing().as_nanos() as i64;
        assert!((pacing - 2_500_000).abs() <= 1);

        assert_eq!("external".parse::<DiscreteDrive>().unwrap(), DiscreteDrive::External);
        assert!("manual".parse::<DiscreteDrive>().is_err());
    }
}
