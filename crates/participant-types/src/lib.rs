//! # Participant Types Crate
//!
//! The vocabulary shared by every crate of the participant runtime: time,
//! domain error codes, the component lifecycle, and the interfaces of the
//! core components (configuration, clocks, jobs, schedulers).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every interface that can cross the plugin
//!   boundary is defined here, together with its interface id.
//! - **Structured Errors**: fallible operations return [`ParticipantError`]
//!   with a closed [`ErrorCode`]; nothing panics across a component edge.
//! - **Lookup by IID**: components find each other through
//!   [`Components::find_component`] and [`get_component`].

pub mod clock;
pub mod component;
pub mod configuration;
pub mod errors;
pub mod job;
pub mod scheduler;
pub mod time;
pub mod xml;

pub use clock::*;
pub use component::*;
pub use configuration::{
    paths, property_double, property_duration, property_string, ConfigurationService,
    PropertyTree, PropertyType, PropertyValue,
};
pub use errors::*;
pub use job::*;
pub use scheduler::*;
pub use time::*;
pub use xml::XmlElement;
