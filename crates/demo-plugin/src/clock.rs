//! Discrete clock advancing by a fixed step, either from its own thread or
//! through [`DemoStepClock::advance`].

use parking_lot::Mutex;
use participant_types::{
    get_component, Clock, ClockService, ClockType, Component, Components, ConfigurationService,
    EventSink, ParticipantError, PropertyValue, Result, Timestamp,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

pub const DEMO_CLOCK_COMPONENT_IID: &str = "demo_clock_component.arya.demo.iid";
pub const DEMO_STEP_CLOCK: &str = "demo_step_clock";
/// Wall time between two steps. `0` leaves stepping to the caller.
pub const DEMO_CLOCK_PERIOD: &str = "demo/clock_period";

const DEFAULT_PERIOD: Duration = Duration::from_millis(1);

#[derive(Default)]
struct StepCore {
    time: Mutex<Timestamp>,
    sink: Mutex<Option<Weak<dyn EventSink>>>,
}

impl StepCore {
    fn sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink.lock().as_ref().and_then(Weak::upgrade)
    }

    fn advance(&self, step: Duration) -> Timestamp {
        let (old, new) = {
            let mut time = self.time.lock();
            let old = *time;
            *time = old + step;
            (old, *time)
        };
        if let Some(sink) = self.sink() {
            sink.time_update_begin(old, new);
            sink.time_updating(new);
            sink.time_update_end(new);
        }
        new
    }
}

pub struct DemoStepClock {
    step: Duration,
    period: Mutex<Duration>,
    core: Arc<StepCore>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DemoStepClock {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            period: Mutex::new(DEFAULT_PERIOD),
            core: Arc::new(StepCore::default()),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn set_period(&self, period: Duration) {
        *self.period.lock() = period;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Advance by one step.
    pub fn advance(&self) -> Result<Timestamp> {
        if !self.is_running() {
            return Err(ParticipantError::invalid_state(format!(
                "clock '{}' is not running",
                DEMO_STEP_CLOCK
            )));
        }
        Ok(self.core.advance(self.step))
    }
}

impl Clock for DemoStepClock {
    fn name(&self) -> String {
        DEMO_STEP_CLOCK.to_string()
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Discrete
    }

    fn time(&self) -> Timestamp {
        *self.core.time.lock()
    }

    fn reset(&self, new_time: Timestamp) {
        let old = std::mem::replace(&mut *self.core.time.lock(), new_time);
        if !self.is_running() {
            return;
        }
        if let Some(sink) = self.core.sink() {
            sink.time_reset_begin(old, new_time);
            sink.time_reset_end(new_time);
        }
    }

    fn start(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ParticipantError::invalid_state(format!(
                "clock '{}' is already running",
                DEMO_STEP_CLOCK
            )));
        }
        *self.core.sink.lock() = Some(event_sink);
        let old = std::mem::replace(&mut *self.core.time.lock(), Timestamp::ZERO);
        if let Some(sink) = self.core.sink() {
            sink.time_reset_begin(old, Timestamp::ZERO);
            sink.time_reset_end(Timestamp::ZERO);
        }

        let period = *self.period.lock();
        if !period.is_zero() {
            let core = Arc::clone(&self.core);
            let running = Arc::clone(&self.running);
            let step = self.step;
            let spawned = thread::Builder::new()
                .name(DEMO_STEP_CLOCK.to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::park_timeout(period);
                        if running.load(Ordering::SeqCst) {
                            core.advance(step);
                        }
                    }
                });
            match spawned {
                Ok(handle) => *self.thread.lock() = Some(handle),
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    self.core.sink.lock().take();
                    return Err(ParticipantError::unexpected(format!(
                        "cannot spawn clock thread: {}",
                        e
                    )));
                }
            }
        }
        debug!(clock = DEMO_STEP_CLOCK, "[DemoPlugin] Clock started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.thread.lock().take() {
            handle.thread().unpark();
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.core.sink.lock().take();
        debug!(clock = DEMO_STEP_CLOCK, time = %self.time(), "[DemoPlugin] Clock stopped");
        Ok(())
    }
}

impl Drop for DemoStepClock {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn configured_period(config: &dyn ConfigurationService) -> Result<Duration> {
    match config.get_property(DEMO_CLOCK_PERIOD) {
        None => Ok(DEFAULT_PERIOD),
        Some(PropertyValue::Int(nanos)) if nanos >= 0 => Ok(Duration::from_nanos(nanos as u64)),
        Some(other) => Err(ParticipantError::invalid_argument(format!(
            "property '{}' must be a nanosecond count >= 0, got '{}'",
            DEMO_CLOCK_PERIOD, other
        ))),
    }
}

/// Registers a [`DemoStepClock`] with the host's clock service between
/// `initialize` and `deinitialize`.
pub struct DemoClockComponent {
    clock: Arc<DemoStepClock>,
    components: Mutex<Option<Arc<dyn Components>>>,
    clock_service: Mutex<Option<Arc<dyn ClockService>>>,
}

impl DemoClockComponent {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(DemoStepClock::new(Duration::from_millis(10))),
            components: Mutex::new(None),
            clock_service: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> Arc<DemoStepClock> {
        Arc::clone(&self.clock)
    }
}

impl Default for DemoClockComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for DemoClockComponent {
    fn iid(&self) -> &str {
        DEMO_CLOCK_COMPONENT_IID
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
            .ok_or_else(|| ParticipantError::invalid_state("demo clock component is not created"))?;
        if let Some(config) = get_component::<dyn ConfigurationService>(components.as_ref()) {
            self.clock.set_period(configured_period(config.as_ref())?);
        }
        let clock_service = get_component::<dyn ClockService>(components.as_ref())
            .ok_or_else(|| ParticipantError::not_found("clock service"))?;
        clock_service.register_clock(self.clock.clone())?;
        info!(clock = DEMO_STEP_CLOCK, "[DemoPlugin] Clock registered");
        *self.clock_service.lock() = Some(clock_service);
        Ok(())
    }

    fn deinitialize(&self) -> Result<()> {
        if let Some(clock_service) = self.clock_service.lock().take() {
            clock_service.unregister_clock(DEMO_STEP_CLOCK)?;
        }
        Ok(())
    }
}
