//! # Component Registry - Ownership and Lifecycle
//!
//! Owns the components of one participant and drives all of them through
//! the shared lifecycle, whether they live in this binary or in a plugin.
//!
//! ```text
//! Constructed ─create─▶ Created ─initialize─▶ Initialized ─tense─▶ Tensed ─start─▶ Started
//!      ▲                   │                      ▲                  ▲  ◀──stop──┘
//!      └──────destroy──────┘  ◀──deinitialize──   └──────relax───────┘
//! ```
//!
//! Forward transitions run in registration order and abort at the first
//! failing component. Reverse transitions run in reverse order, visit every
//! component and report the first failure.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = ComponentRegistry::new();
//! registry.add_component(InterfaceHandle::new(configuration), ComponentSource::Native)?;
//! registry.load_plugin("libclock.so", CLOCK_IID)?;
//!
//! registry.create()?;
//! registry.initialize()?;
//! registry.tense()?;
//! registry.start()?;
//! ```

use crate::components_file::{ComponentDescription, ComponentsFile};
use crate::loader::{PluginError, PluginLibrary};
use participant_telemetry::metrics::COMPONENTS_LOADED;
use participant_types::{Components, InterfaceHandle, ParticipantError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Lifecycle state shared by the registry and all of its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Created,
    Initialized,
    Tensed,
    Started,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Created => "created",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Tensed => "tensed",
            LifecycleState::Started => "started",
        };
        f.write_str(name)
    }
}

/// Where a component came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentSource {
    Native,
    Plugin(PathBuf),
}

impl ComponentSource {
    pub fn label(&self) -> &'static str {
        match self {
            ComponentSource::Native => "native",
            ComponentSource::Plugin(_) => "plugin",
        }
    }
}

/// Factory for components provided by the hosting binary.
pub type NativeFactory<'a> = &'a dyn Fn(&str) -> Option<InterfaceHandle>;

/// The lookup handed to components on `create`.
///
/// Shared between the registry and every component it created, so it only
/// holds the handles; the registry clears it on `destroy`.
#[derive(Default)]
pub struct RegistryLookup {
    handles: RwLock<Vec<InterfaceHandle>>,
}

impl RegistryLookup {
    fn push(&self, handle: InterfaceHandle) {
        self.handles.write().push(handle);
    }

    fn clear(&self) {
        self.handles.write().clear();
    }
}

impl Components for RegistryLookup {
    fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
        self.handles
            .read()
            .iter()
            .find(|handle| handle.iid() == iid)
            .cloned()
    }
}

struct RegistryEntry {
    handle: InterfaceHandle,
    source: ComponentSource,
}

/// Central registry for the components of a participant.
pub struct ComponentRegistry {
    entries: Vec<RegistryEntry>,
    lookup: Arc<RegistryLookup>,
    /// Dropped strictly after `entries`.
    libraries: Vec<PluginLibrary>,
    state: LifecycleState,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            lookup: Arc::new(RegistryLookup::default()),
            libraries: Vec::new(),
            state: LifecycleState::Constructed,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Register a component. Only allowed before `create`.
    pub fn add_component(&mut self, handle: InterfaceHandle, source: ComponentSource) -> Result<()> {
        if self.state != LifecycleState::Constructed {
            error!(
                iid = %handle.iid(),
                state = %self.state,
                "[Registry] Cannot add component after create"
            );
            return Err(ParticipantError::invalid_state(format!(
                "cannot add component '{}' in state {}",
                handle.iid(),
                self.state
            )));
        }
        if self.find_component(handle.iid()).is_some() {
            warn!(iid = %handle.iid(), "[Registry] IID already registered, lookups return the first");
        }

        info!(iid = %handle.iid(), source = source.label(), "[Registry] Registering component");
        COMPONENTS_LOADED.with_label_values(&[source.label()]).inc();
        self.lookup.push(handle.clone());
        self.entries.push(RegistryEntry { handle, source });
        Ok(())
    }

    /// Load (or reuse) the plugin at `path` and register its component for `iid`.
    pub fn load_plugin(
        &mut self,
        path: impl AsRef<Path>,
        iid: &str,
    ) -> std::result::Result<(), PluginError> {
        let path = path.as_ref();
        let index = match self.libraries.iter().position(|lib| lib.path() == path) {
            Some(index) => index,
            None => {
                self.libraries.push(PluginLibrary::load(path)?);
                self.libraries.len() - 1
            }
        };
        let handle = self.libraries[index].create_component(iid)?;
        if handle.iid() != iid {
            return Err(PluginError::Component(ParticipantError::unexpected(format!(
                "plugin '{}' returned '{}' when asked for '{}'",
                path.display(),
                handle.iid(),
                iid
            ))));
        }
        self.add_component(handle, ComponentSource::Plugin(path.to_path_buf()))?;
        Ok(())
    }

    /// Register every component listed in a components file.
    pub fn load_components_file(
        &mut self,
        file: &ComponentsFile,
        native: NativeFactory<'_>,
    ) -> Result<()> {
        for description in &file.components {
            self.add_described(description, native)?;
        }
        Ok(())
    }

    fn add_described(
        &mut self,
        description: &ComponentDescription,
        native: NativeFactory<'_>,
    ) -> Result<()> {
        match &description.source {
            ComponentSource::Native => {
                let handle = native(&description.iid).ok_or_else(|| {
                    ParticipantError::not_found(format!(
                        "no native component for '{}'",
                        description.iid
                    ))
                })?;
                self.add_component(handle, ComponentSource::Native)
            }
            ComponentSource::Plugin(path) => self
                .load_plugin(path, &description.iid)
                .map_err(ParticipantError::from),
        }
    }

    /// First registered component whose IID equals `iid`.
    pub fn find_component(&self, iid: &str) -> Option<InterfaceHandle> {
        self.lookup.find_component(iid)
    }

    /// The lookup service components receive on `create`.
    pub fn components(&self) -> Arc<dyn Components> {
        self.lookup.clone()
    }

    pub fn component_iids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.handle.iid().to_string())
            .collect()
    }

    pub fn source_of(&self, iid: &str) -> Option<&ComponentSource> {
        self.entries
            .iter()
            .find(|entry| entry.handle.iid() == iid)
            .map(|entry| &entry.source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn plugin_count(&self) -> usize {
        self.libraries.len()
    }

    pub fn create(&mut self) -> Result<()> {
        self.expect_state("create", LifecycleState::Constructed)?;
        let lookup: Arc<dyn Components> = self.lookup.clone();
        self.forward("create", |handle| handle.component().create(Arc::clone(&lookup)))?;
        self.state = LifecycleState::Created;
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state("initialize", LifecycleState::Created)?;
        self.forward("initialize", |handle| handle.component().initialize())?;
        self.state = LifecycleState::Initialized;
        Ok(())
    }

    pub fn tense(&mut self) -> Result<()> {
        self.expect_state("tense", LifecycleState::Initialized)?;
        self.forward("tense", |handle| handle.component().tense())?;
        self.state = LifecycleState::Tensed;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", LifecycleState::Tensed)?;
        self.forward("start", |handle| handle.component().start())?;
        self.state = LifecycleState::Started;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", LifecycleState::Started)?;
        let outcome = self.reverse("stop", |handle| handle.component().stop());
        self.state = LifecycleState::Tensed;
        outcome
    }

    pub fn relax(&mut self) -> Result<()> {
        self.expect_state("relax", LifecycleState::Tensed)?;
        let outcome = self.reverse("relax", |handle| handle.component().relax());
        self.state = LifecycleState::Initialized;
        outcome
    }

    pub fn deinitialize(&mut self) -> Result<()> {
        self.expect_state("deinitialize", LifecycleState::Initialized)?;
        let outcome = self.reverse("deinitialize", |handle| handle.component().deinitialize());
        self.state = LifecycleState::Created;
        outcome
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.expect_state("destroy", LifecycleState::Created)?;
        let outcome = self.reverse("destroy", |handle| handle.component().destroy());
        self.lookup.clear();
        self.state = LifecycleState::Constructed;
        outcome
    }

    /// Drop every component, then unload the plugins they came from.
    pub fn clear(&mut self) -> Result<()> {
        if self.state != LifecycleState::Constructed {
            return Err(ParticipantError::invalid_state(format!(
                "cannot clear registry in state {}",
                self.state
            )));
        }
        self.lookup.clear();
        while self.entries.pop().is_some() {}
        for library in self.libraries.drain(..).rev() {
            info!(path = %library.path().display(), "[Registry] Unloading plugin");
        }
        Ok(())
    }

    fn expect_state(&self, transition: &str, expected: LifecycleState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        error!(
            transition,
            state = %self.state,
            "[Registry] Transition not allowed in current state"
        );
        Err(ParticipantError::invalid_state(format!(
            "{} requires state {}, registry is {}",
            transition, expected, self.state
        )))
    }

    fn forward(
        &self,
        transition: &str,
        call: impl Fn(&InterfaceHandle) -> Result<()>,
    ) -> Result<()> {
        info!(transition, count = self.entries.len(), "[Registry] Running transition");
        for entry in &self.entries {
            if let Err(e) = call(&entry.handle) {
                error!(transition, iid = %entry.handle.iid(), error = %e, "[Registry] ✗ Component failed");
                return Err(e.context(format!("{} of '{}'", transition, entry.handle.iid())));
            }
        }
        info!(transition, "[Registry] ✓ All components done");
        Ok(())
    }

    fn reverse(
        &self,
        transition: &str,
        call: impl Fn(&InterfaceHandle) -> Result<()>,
    ) -> Result<()> {
        info!(transition, count = self.entries.len(), "[Registry] Running transition");
        let mut first = None;
        for entry in self.entries.iter().rev() {
            if let Err(e) = call(&entry.handle) {
                error!(transition, iid = %entry.handle.iid(), error = %e, "[Registry] ✗ Component failed");
                first.get_or_insert_with(|| {
                    e.context(format!("{} of '{}'", transition, entry.handle.iid()))
                });
            }
        }
        match first {
            Some(e) => Err(e),
            None => {
                info!(transition, "[Registry] ✓ All components done");
                Ok(())
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ComponentRegistry {
    fn drop(&mut self) {
        if self.state != LifecycleState::Constructed {
            warn!(state = %self.state, "[Registry] Dropped without destroy");
        }
        self.lookup.clear();
        self.entries.clear();
        self.libraries.clear();
    }
}
