//! # Clock Service Component
//!
//! Holds the registered clocks, resolves the main clock at `tense` and
//! forwards the main clock's events to every registered event sink.
//!
//! ```text
//! main clock ──events──▶ ServiceSink ──▶ EventSinkList ──▶ sink, sink, ...
//!                          └─ CLOCK_RESETS{clock}
//! ```
//!
//! The clock set is frozen while started: registering or unregistering a
//! clock then fails with `invalid_state`.

use crate::realtime::{LocalSystemRealtimeClock, DEFAULT_SAMPLE_PERIOD};
use crate::simtime::{DiscreteDrive, LocalSystemSimtimeClock, SimtimeSettings, DEFAULT_STEP_SIZE};
use crate::sinks::EventSinkList;
use parking_lot::{Mutex, RwLock};
use participant_telemetry::metrics::CLOCK_RESETS;
use participant_types::{
    get_component, paths, property_double, property_duration, property_string, Clock,
    ClockEvent, ClockService, ClockType, Component, ComponentInterface, Components,
    ConfigurationService, EventSink, ParticipantError, Result, Timestamp, LOCAL_SYSTEM_REALTIME,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Receives the main clock's events and fans them out.
#[derive(Default)]
struct ServiceSink {
    sinks: EventSinkList,
    main_clock: RwLock<String>,
}

impl EventSink for ServiceSink {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        self.sinks.dispatch(ClockEvent::UpdateBegin {
            old: old_time,
            new: new_time,
        });
    }

    fn time_updating(&self, new_time: Timestamp) {
        self.sinks.dispatch(ClockEvent::Updating { new: new_time });
    }

    fn time_update_end(&self, new_time: Timestamp) {
        self.sinks.dispatch(ClockEvent::UpdateEnd { new: new_time });
    }

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        let clock = self.main_clock.read().clone();
        CLOCK_RESETS.with_label_values(&[clock.as_str()]).inc();
        debug!(%clock, old = %old_time, new = %new_time, "[ClockService] Time reset");
        self.sinks.dispatch(ClockEvent::ResetBegin {
            old: old_time,
            new: new_time,
        });
    }

    fn time_reset_end(&self, new_time: Timestamp) {
        self.sinks.dispatch(ClockEvent::ResetEnd { new: new_time });
    }
}

struct ServiceState {
    clocks: BTreeMap<String, Arc<dyn Clock>>,
    main_clock_name: String,
    main: Option<Arc<dyn Clock>>,
    started: bool,
}

pub struct ClockServiceComponent {
    state: RwLock<ServiceState>,
    fanout: Arc<ServiceSink>,
    configuration: Mutex<Option<Arc<dyn ConfigurationService>>>,
    realtime: Arc<LocalSystemRealtimeClock>,
    simtime: Arc<LocalSystemSimtimeClock>,
}

impl ClockServiceComponent {
    pub fn new() -> Self {
        let realtime = Arc::new(LocalSystemRealtimeClock::new());
        let simtime = Arc::new(LocalSystemSimtimeClock::new());

        let mut clocks: BTreeMap<String, Arc<dyn Clock>> = BTreeMap::new();
        clocks.insert(realtime.name(), realtime.clone());
        clocks.insert(simtime.name(), simtime.clone());

        Self {
            state: RwLock::new(ServiceState {
                clocks,
                main_clock_name: LOCAL_SYSTEM_REALTIME.to_string(),
                main: None,
                started: false,
            }),
            fanout: Arc::new(ServiceSink::default()),
            configuration: Mutex::new(None),
            realtime,
            simtime,
        }
    }

    /// The native discrete clock, for external stepping.
    pub fn simtime_clock(&self) -> Arc<LocalSystemSimtimeClock> {
        Arc::clone(&self.simtime)
    }

    pub fn realtime_clock(&self) -> Arc<LocalSystemRealtimeClock> {
        Arc::clone(&self.realtime)
    }

    pub fn is_started(&self) -> bool {
        self.state.read().started
    }

    /// Live registered event sinks.
    pub fn event_sink_count(&self) -> usize {
        self.fanout.sinks.len()
    }

    fn configuration(&self) -> Option<Arc<dyn ConfigurationService>> {
        self.configuration.lock().clone()
    }

    fn configure_native_clocks(&self, config: &dyn ConfigurationService) -> Result<()> {
        let settings = SimtimeSettings {
            step_size: property_duration(config, paths::STEP_SIZE, DEFAULT_STEP_SIZE)?,
            time_factor: property_double(
                config,
                paths::TIME_FACTOR,
                crate::simtime::DEFAULT_TIME_FACTOR,
            ),
            drive: property_string(config, paths::DISCRETE_DRIVE, "timer").parse::<DiscreteDrive>()?,
        };
        self.simtime.configure(settings)?;
        self.realtime.set_sample_period(property_duration(
            config,
            paths::SAMPLE_PERIOD,
            DEFAULT_SAMPLE_PERIOD,
        )?)?;
        debug!(
            step_size_us = settings.step_size.as_micros() as u64,
            time_factor = settings.time_factor,
            drive = %settings.drive,
            "[ClockService] Native clocks configured"
        );
        Ok(())
    }

    fn reject_while_started(&self, started: bool, operation: &str, clock: &str) -> Result<()> {
        if started {
            error!(%clock, operation, "[ClockService] Clock set is frozen while started");
            return Err(ParticipantError::invalid_state(format!(
                "cannot {} clock '{}' while the clock service is started",
                operation, clock
            )));
        }
        Ok(())
    }
}

impl Default for ClockServiceComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ClockServiceComponent {
    fn iid(&self) -> &str {
        <dyn ClockService as ComponentInterface>::IID
    }

    fn create(&self, components: Arc<dyn Components>) -> Result<()> {
        let configuration = get_component::<dyn ConfigurationService>(components.as_ref());
        if configuration.is_none() {
            warn!("[ClockService] No configuration service, using defaults");
        }
        *self.configuration.lock() = configuration;
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.configuration.lock().take();
        Ok(())
    }

    fn initialize(&self) -> Result<()> {
        if let Some(config) = self.configuration() {
            self.configure_native_clocks(config.as_ref())?;
        }
        Ok(())
    }

    fn tense(&self) -> Result<()> {
        let name = match self.configuration() {
            Some(config) => property_string(config.as_ref(), paths::MAIN_CLOCK, LOCAL_SYSTEM_REALTIME),
            None => LOCAL_SYSTEM_REALTIME.to_string(),
        };

        let mut state = self.state.write();
        let clock = state.clocks.get(&name).cloned().ok_or_else(|| {
            error!(clock = %name, "[ClockService] Main clock is not registered");
            ParticipantError::not_found(format!("main clock '{}' is not registered", name))
        })?;
        info!(clock = %name, clock_type = %clock.clock_type(), "[ClockService] Main clock selected");
        *self.fanout.main_clock.write() = name.clone();
        state.main_clock_name = name;
        state.main = Some(clock);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let main = {
            let mut state = self.state.write();
            if state.started {
                return Err(ParticipantError::invalid_state("clock service already started"));
            }
            let main = state
                .main
                .clone()
                .ok_or_else(|| ParticipantError::invalid_state("no main clock, tense first"))?;
            state.started = true;
            main
        };

        let sink: Weak<dyn EventSink> = Arc::downgrade(&self.fanout) as Weak<dyn EventSink>;
        if let Err(e) = main.start(sink) {
            self.state.write().started = false;
            error!(clock = %main.name(), error = %e, "[ClockService] Main clock failed to start");
            return Err(e);
        }
        info!(clock = %main.name(), "[ClockService] Started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let main = {
            let state = self.state.read();
            if !state.started {
                return Ok(());
            }
            state.main.clone()
        };
        let outcome = main.map_or(Ok(()), |clock| clock.stop());
        self.state.write().started = false;
        info!("[ClockService] Stopped");
        outcome
    }

    fn relax(&self) -> Result<()> {
        self.state.write().main = None;
        Ok(())
    }
}

impl ClockService for ClockServiceComponent {
    fn time(&self) -> Timestamp {
        let main = {
            let state = self.state.read();
            if !state.started {
                return Timestamp::ZERO;
            }
            state.main.clone()
        };
        main.map_or(Timestamp::ZERO, |clock| clock.time())
    }

    fn time_of(&self, clock_name: &str) -> Option<Timestamp> {
        let clock = self.find_clock(clock_name);
        if clock.is_none() {
            warn!(clock = clock_name, "[ClockService] Unknown clock, no time available");
        }
        clock.map(|clock| clock.time())
    }

    fn clock_type(&self) -> ClockType {
        let state = self.state.read();
        state
            .main
            .as_ref()
            .or_else(|| state.clocks.get(&state.main_clock_name))
            .map_or(ClockType::Continuous, |clock| clock.clock_type())
    }

    fn clock_type_of(&self, clock_name: &str) -> Option<ClockType> {
        let clock = self.find_clock(clock_name);
        if clock.is_none() {
            warn!(clock = clock_name, "[ClockService] Unknown clock, no type available");
        }
        clock.map(|clock| clock.clock_type())
    }

    fn main_clock_name(&self) -> String {
        self.state.read().main_clock_name.clone()
    }

    fn register_event_sink(&self, event_sink: Weak<dyn EventSink>) -> Result<()> {
        if !self.fanout.sinks.register(event_sink) {
            debug!("[ClockService] Event sink already registered");
        }
        Ok(())
    }

    fn unregister_event_sink(&self, event_sink: &Weak<dyn EventSink>) -> Result<()> {
        if self.fanout.sinks.unregister(event_sink) {
            Ok(())
        } else {
            Err(ParticipantError::not_found("event sink is not registered"))
        }
    }

    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<()> {
        let name = clock.name();
        let mut state = self.state.write();
        self.reject_while_started(state.started, "register", &name)?;
        if state.clocks.contains_key(&name) {
            error!(clock = %name, "[ClockService] Clock name already registered");
            return Err(ParticipantError::resource_in_use(format!(
                "clock '{}' is already registered",
                name
            )));
        }
        info!(clock = %name, clock_type = %clock.clock_type(), "[ClockService] Clock registered");
        state.clocks.insert(name, clock);
        Ok(())
    }

    fn unregister_clock(&self, clock_name: &str) -> Result<()> {
        let mut state = self.state.write();
        self.reject_while_started(state.started, "unregister", clock_name)?;
        if state.clocks.remove(clock_name).is_none() {
            return Err(ParticipantError::not_found(format!(
                "clock '{}' is not registered",
                clock_name
            )));
        }
        if state.main.as_ref().is_some_and(|main| main.name() == clock_name) {
            state.main = None;
        }
        info!(clock = clock_name, "[ClockService] Clock unregistered");
        Ok(())
    }

    fn clock_names(&self) -> Vec<String> {
        self.state.read().clocks.keys().cloned().collect()
    }

    fn find_clock(&self, clock_name: &str) -> Option<Arc<dyn Clock>> {
        self.state.read().clocks.get(clock_name).cloned()
    }
}

impl Drop for ClockServiceComponent {
    fn drop(&mut self) {
        let main = self.state.get_mut().main.take();
        if let Some(clock) = main {
            if let Err(e) = clock.stop() {
                warn!(clock = %clock.name(), error = %e, "[ClockService] Main clock failed to stop on drop");
            }
        }
    }
}
