//! # Demo Plugin
//!
//! A participant plugin with two components:
//!
//! | IID | Component | On `initialize` |
//! |-----|-----------|-----------------|
//! | `demo_clock_component.arya.demo.iid` | [`DemoClockComponent`] | registers the `demo_step_clock` discrete clock |
//! | `demo_jobs_component.arya.demo.iid` | [`DemoJobsComponent`] | adds the `demo_counter` job |
//!
//! Both reach the host's services through the lookup they receive on
//! `create`, so every call into the host crosses the plugin boundary.

pub mod clock;
pub mod jobs;

pub use clock::{DemoClockComponent, DemoStepClock, DEMO_CLOCK_COMPONENT_IID, DEMO_STEP_CLOCK};
pub use jobs::{CounterJob, DemoJobsComponent, COUNTER_JOB, DEMO_JOBS_COMPONENT_IID};

use participant_types::InterfaceHandle;
use std::sync::Arc;

pub const PLUGIN_VERSION: &str = "0.1.0";

/// Components this plugin offers, by IID.
pub fn create_component(iid: &str) -> Option<InterfaceHandle> {
    match iid {
        DEMO_CLOCK_COMPONENT_IID => Some(InterfaceHandle::untyped(Arc::new(DemoClockComponent::new()))),
        DEMO_JOBS_COMPONENT_IID => Some(InterfaceHandle::untyped(Arc::new(DemoJobsComponent::new()))),
        _ => None,
    }
}

plugin_bridge::export_participant_plugin! {
    version: "0.1.0",
    factory: create_component,
}
