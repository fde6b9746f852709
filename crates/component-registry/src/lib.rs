//! # Component Registry Crate
//!
//! Hosts the components of a participant.
//!
//! - [`ComponentRegistry`] owns native and plugin components and drives
//!   their lifecycle in registration order.
//! - [`PluginLibrary`] loads a plugin binary and creates components from it.
//! - [`ComponentsFile`] lists extra components to load at start-up.
//!
//! Components are always dropped before the plugin library that defines
//! them is unloaded.

pub mod components_file;
pub mod loader;
pub mod registry;

pub use components_file::{ComponentDescription, ComponentsFile};
pub use loader::{PluginError, PluginLibrary};
pub use registry::{
    ComponentRegistry, ComponentSource, LifecycleState, NativeFactory, RegistryLookup,
};
