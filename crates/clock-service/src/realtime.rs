//! # Local System Realtime Clock
//!
//! Continuous clock following wall time. A sampling thread reports the
//! current time every sample period; the time between samples is never
//! reported, only sampled.
//!
//! Every start begins at time zero. Time is frozen at zero while the reset
//! sequence is emitted and at the stop time while stopped.

use crate::sinks::SinkSlot;
use crate::timer::{sleep_until, ClockThread};
use parking_lot::Mutex;
use participant_types::{
    Clock, ClockType, EventSink, ParticipantError, Result, Timestamp, LOCAL_SYSTEM_REALTIME,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

#[derive(Default)]
struct WallTime {
    /// `(instant, time at instant)` while running.
    origin: Mutex<Option<(Instant, Timestamp)>>,
    frozen: Mutex<Timestamp>,
    last_reported: Mutex<Timestamp>,
    sink: SinkSlot,
}

impl WallTime {
    fn now(&self) -> Timestamp {
        match *self.origin.lock() {
            Some((instant, base)) => base + instant.elapsed(),
            None => *self.frozen.lock(),
        }
    }

    fn reset(&self, old: Timestamp, new: Timestamp) {
        *self.origin.lock() = None;
        *self.frozen.lock() = new;
        *self.last_reported.lock() = new;
        self.sink.emit_reset(old, new);
        *self.origin.lock() = Some((Instant::now(), new));
    }

    fn sample(&self) {
        let new = self.now();
        let old = std::mem::replace(&mut *self.last_reported.lock(), new);
        self.sink.emit_update(old, new);
    }
}

pub struct LocalSystemRealtimeClock {
    sample_period: Mutex<Duration>,
    time: Arc<WallTime>,
    thread: Mutex<Option<ClockThread>>,
}

impl LocalSystemRealtimeClock {
    pub fn new() -> Self {
        Self::with_sample_period(DEFAULT_SAMPLE_PERIOD)
    }

    pub fn with_sample_period(sample_period: Duration) -> Self {
        Self {
            sample_period: Mutex::new(sample_period),
            time: Arc::new(WallTime::default()),
            thread: Mutex::new(None),
        }
    }

    pub fn sample_period(&self) -> Duration {
        *self.sample_period.lock()
    }

    /// Change the sample period. Rejected while running.
    pub fn set_sample_period(&self, sample_period: Duration) -> Result<()> {
        if sample_period.is_zero() {
            return Err(ParticipantError::invalid_argument(
                "sample_period: must be greater than 0",
            ));
        }
        if self.is_running() {
            return Err(ParticipantError::invalid_state(
                "cannot change the sample period of a running clock",
            ));
        }
        *self.sample_period.lock() = sample_period;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }
}

impl Default for LocalSystemRealtimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for LocalSystemRealtimeClock {
    fn name(&self) -> String {
        LOCAL_SYSTEM_REALTIME.to_string()
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Continuous
    }

    fn time(&self) -> Timestamp {
        self.time.now()
    }

    fn reset(&self, new_time: Timestamp) {
        if self.is_running() {
            let old = self.time.now();
            self.time.reset(old, new_time);
        } else {
            *self.time.frozen.lock() = new_time;
        }
    }

    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Err(ParticipantError::invalid_state(format!(
                "clock '{}' is already running",
                LOCAL_SYSTEM_REALTIME
            )));
        }

        self.time.sink.set(event_sink);
        let old = *self.time.frozen.lock();
        self.time.reset(old, Timestamp::ZERO);

        let period = *self.sample_period.lock();
        let time = Arc::clone(&self.time);
        *thread = Some(ClockThread::spawn(LOCAL_SYSTEM_REALTIME, move |stop: Arc<AtomicBool>| {
            let mut deadline = Instant::now();
            loop {
                deadline += period;
                if !sleep_until(deadline, &stop) {
                    break;
                }
                time.sample();
            }
        })?);

        info!(
            clock = LOCAL_SYSTEM_REALTIME,
            sample_period_us = period.as_micros() as u64,
            "[ClockService] Clock started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };
        thread.stop();
        let at = self.time.now();
        *self.time.origin.lock() = None;
        *self.time.frozen.lock() = at;
        self.time.sink.clear();
        debug!(clock = LOCAL_SYSTEM_REALTIME, time = %at, "[ClockService] Clock stopped");
        Ok(())
    }
}

impl Drop for LocalSystemRealtimeClock {
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

    fn wait_for_updates(recorder: &Recorder, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let seen = recorder
                .0
                .lock()
                .iter()
                .filter(|e| matches!(e, ClockEvent::Updating { .. }))
                .count();
            if seen >= count {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("clock produced fewer than {} updates", count);
    }

    #[test]
    fn test_reset_first_then_increasing_samples() {
        let clock = LocalSystemRealtimeClock::with_sample_period(Duration::from_millis(2));
        let recorder = Arc::new(Recorder::default());
        clock
            .start(Arc::downgrade(&recorder) as Weak<dyn EventSink>)
            .unwrap();
        wait_for_updates(&recorder, 3);
        clock.stop().unwrap();

        let events = recorder.0.lock().clone();
        assert_eq!(
            &events[..2],
            &[
                ClockEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::ZERO },
                ClockEvent::ResetEnd { new: Timestamp::ZERO },
            ]
        );
        let times: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ClockEvent::Updating { new } => Some(*new),
                _ => None,
            })
            .collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(times[0] > Timestamp::ZERO);
    }

    #[test]
    fn test_restart_resets_from_stop_time() {
        let clock = LocalSystemRealtimeClock::with_sample_period(Duration::from_millis(1));
        let recorder = Arc::new(Recorder::default());
        let sink = Arc::downgrade(&recorder) as Weak<dyn EventSink>;

        clock.start(sink.clone()).unwrap();
        wait_for_updates(&recorder, 2);
        clock.stop().unwrap();
        let stopped_at = clock.time();
        assert!(stopped_at > Timestamp::ZERO);
        std::thread::sleep(Duration::from_millis(3));
        assert_eq!(clock.time(), stopped_at);

        recorder.0.lock().clear();
        clock.start(sink).unwrap();
        clock.stop().unwrap();
        assert_eq!(
            recorder.0.lock()[0],
            ClockEvent::ResetBegin { old: stopped_at, new: Timestamp::ZERO }
        );
    }

    #[test]
    fn test_double_start_rejected() {
        let clock = LocalSystemRealtimeClock::new();
        let recorder = Arc::new(Recorder::default());
        let sink = Arc::downgrade(&recorder) as Weak<dyn EventSink>;
        clock.start(sink.clone()).unwrap();
        assert!(clock.start(sink).is_err());
        assert!(clock.set_sample_period(Duration::from_millis(5)).is_err());
        clock.stop().unwrap();
        clock.set_sample_period(Duration::from_millis(5)).unwrap();
        assert!(clock.set_sample_period(Duration::ZERO).is_err());
    }
}
