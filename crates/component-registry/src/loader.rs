//! # Plugin Loader
//!
//! Loads a plugin library with `libloading`, checks its export surface and
//! asks it for components.
//!
//! ```text
//! load(path) ─▶ get_version ─▶ get_participant_library_version ─▶ compatible?
//!                                                                    │
//! create_component(iid) ◀── <prefix>_<abi>_create_component ◀────────┘
//! ```
//!
//! The version namespace is bound once at load time; every component taken
//! from the library holds a [`SharedBinary`] so the library stays mapped
//! until the last proxy is gone.

use libloading::Library;
use participant_types::{ErrorCode, InterfaceHandle, ParticipantError};
use plugin_bridge::{
    request_component, AbiVersion, CreateComponentFn, GetLibraryVersionFn, GetVersionFn,
    InterfaceError, IsDebugBuildFn, ParticipantLibraryVersion, SharedBinary,
    GET_LIBRARY_VERSION_SYMBOL, GET_VERSION_SYMBOL, IS_DEBUG_BUILD_SYMBOL,
};
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Host-side failures while loading a plugin or creating from it.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to load plugin '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("plugin '{path}' does not export '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("plugin '{path}' uses participant library {plugin}, host uses {host}")]
    IncompatibleVersion {
        path: PathBuf,
        plugin: String,
        host: String,
    },

    #[error("boundary call failed: {0}")]
    Boundary(#[from] InterfaceError),

    #[error("plugin does not provide a component for '{iid}'")]
    NotCapable { iid: String },

    #[error(transparent)]
    Component(#[from] ParticipantError),
}

impl From<PluginError> for ParticipantError {
    fn from(error: PluginError) -> Self {
        let code = match &error {
            PluginError::Load { .. } | PluginError::MissingSymbol { .. } => ErrorCode::NotFound,
            PluginError::IncompatibleVersion { .. } | PluginError::NotCapable { .. } => {
                ErrorCode::NotSupported
            }
            PluginError::Boundary(_) => ErrorCode::Unexpected,
            PluginError::Component(inner) => return inner.clone(),
        };
        ParticipantError::new(code, error.to_string())
    }
}

/// A loaded plugin library.
pub struct PluginLibrary {
    path: PathBuf,
    version: String,
    library_version: String,
    debug_build: bool,
    abi: AbiVersion,
    create: CreateComponentFn,
    binary: SharedBinary,
}

impl PluginLibrary {
    /// Load with the ABI version of this build.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        Self::load_with(path, AbiVersion::CURRENT)
    }

    pub fn load_with(path: impl AsRef<Path>, abi: AbiVersion) -> Result<Self, PluginError> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: loading runs the library's initialisers; plugins are trusted code.
        let library = unsafe { Library::new(&path) }.map_err(|e| PluginError::Load {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let get_version: GetVersionFn = symbol(&library, &path, GET_VERSION_SYMBOL)?;
        let get_library_version: GetLibraryVersionFn =
            symbol(&library, &path, GET_LIBRARY_VERSION_SYMBOL)?;
        let create: CreateComponentFn = symbol(&library, &path, abi.create_component_symbol())?;
        let debug_build = symbol::<IsDebugBuildFn>(&library, &path, IS_DEBUG_BUILD_SYMBOL)
            .map(|is_debug| unsafe { is_debug() })
            .unwrap_or(false);

        let version = unsafe {
            let raw = get_version();
            if raw.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        };

        let host = ParticipantLibraryVersion::current();
        let plugin = unsafe { get_library_version() };
        if !plugin.is_compatible_with(&host) {
            return Err(PluginError::IncompatibleVersion {
                path,
                plugin: plugin.to_string(),
                host: host.to_string(),
            });
        }

        info!(
            path = %path.display(),
            %version,
            library_version = %plugin,
            debug_build,
            abi = %abi,
            "[Plugin] Loaded plugin library"
        );

        Ok(Self {
            path,
            version,
            library_version: plugin.to_string(),
            debug_build,
            abi,
            create,
            binary: SharedBinary::new(library),
        })
    }

    /// Ask the plugin for a component implementing `iid`.
    pub fn create_component(&self, iid: &str) -> Result<InterfaceHandle, PluginError> {
        debug!(path = %self.path.display(), %iid, "[Plugin] Requesting component");
        // SAFETY: `create` was resolved from the library `binary` keeps mapped.
        match unsafe { request_component(self.create, iid, self.binary.clone()) }? {
            Some(component) => Ok(component),
            None => Err(PluginError::NotCapable {
                iid: iid.to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version string reported by the plugin itself.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Participant library version the plugin was built with.
    pub fn library_version(&self) -> &str {
        &self.library_version
    }

    pub fn is_debug_build(&self) -> bool {
        self.debug_build
    }

    pub fn abi(&self) -> AbiVersion {
        self.abi
    }

    /// Components and proxies currently keeping the library mapped, plus this handle.
    pub fn holders(&self) -> usize {
        self.binary.holders()
    }
}

impl std::fmt::Debug for PluginLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLibrary")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("abi", &self.abi)
            .finish()
    }
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &[u8]) -> Result<T, PluginError> {
    // SAFETY: `T` is the fn pointer type the symbol is exported with.
    let found = unsafe { library.get::<T>(name) }.map_err(|_| PluginError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned(),
    })?;
    Ok(*found)
}
