//! # ABI Versions
//!
//! The layout of every access structure is versioned. A plugin exports its
//! factory under a symbol that names the version, and the loader binds to
//! exactly one version, chosen once when the binary is loaded.

use std::ffi::c_char;
use std::fmt;

/// Version namespace of the access structure layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiVersion {
    Arya,
}

impl AbiVersion {
    /// The version this build of the bridge speaks.
    pub const CURRENT: AbiVersion = AbiVersion::Arya;

    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            AbiVersion::Arya => "arya",
        }
    }

    /// NUL-terminated name of the component factory symbol.
    #[must_use]
    pub fn create_component_symbol(self) -> &'static [u8] {
        match self {
            AbiVersion::Arya => b"participant_plugin_arya_create_component\0",
        }
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Symbol returning the plugin's own version string.
pub const GET_VERSION_SYMBOL: &[u8] = b"participant_plugin_get_version\0";

/// Symbol returning the participant library version the plugin was built with.
pub const GET_LIBRARY_VERSION_SYMBOL: &[u8] = b"participant_plugin_get_participant_library_version\0";

/// Optional symbol present in debug builds of a plugin.
pub const IS_DEBUG_BUILD_SYMBOL: &[u8] = b"participant_plugin_is_debug_build\0";

/// Version of the participant library, as reported across the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantLibraryVersion {
    /// NUL-terminated library id.
    pub id: *const c_char,
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

// SAFETY: `id` always points to a static string.
unsafe impl Send for ParticipantLibraryVersion {}
unsafe impl Sync for ParticipantLibraryVersion {}

/// Id reported by every build of this library.
pub const LIBRARY_ID: &str = "participant_library";

const LIBRARY_ID_C: &[u8] = b"participant_library\0";

impl ParticipantLibraryVersion {
    /// Version of the library this crate is part of.
    #[must_use]
    pub fn current() -> Self {
        Self {
            id: LIBRARY_ID_C.as_ptr().cast(),
            major: parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: parse_component(env!("CARGO_PKG_VERSION_MINOR")),
            patch: parse_component(env!("CARGO_PKG_VERSION_PATCH")),
        }
    }

    /// Plugins must share major and minor version with the host.
    #[must_use]
    pub fn is_compatible_with(&self, host: &ParticipantLibraryVersion) -> bool {
        self.major == host.major && self.minor == host.minor
    }
}

impl fmt::Display for ParticipantLibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn parse_component(text: &str) -> i32 {
    text.parse().unwrap_or(0)
}
