//! # Error Types
//!
//! Domain result codes shared by every component. Each fallible operation
//! returns a [`ParticipantError`] carrying one [`ErrorCode`] plus a free-text
//! description. The codes have stable integer values so they can cross the
//! plugin boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of domain result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// The requested item does not exist.
    NotFound = -20,
    /// The resource is already taken (e.g. a duplicate name).
    ResourceInUse = -21,
    /// An argument failed validation.
    InvalidArgument = -5,
    /// The operation is not allowed in the current state.
    InvalidState = -38,
    /// A required reference was missing.
    Pointer = -4,
    /// The operation is not supported by this implementation.
    NotSupported = -3,
    /// The operation timed out.
    Timeout = -27,
    /// The component has not been initialised yet.
    NotInitialised = -37,
    /// Anything else.
    Unexpected = -1,
}

impl ErrorCode {
    /// All codes, in declaration order.
    pub const ALL: [ErrorCode; 9] = [
        Self::NotFound,
        Self::ResourceInUse,
        Self::InvalidArgument,
        Self::InvalidState,
        Self::Pointer,
        Self::NotSupported,
        Self::Timeout,
        Self::NotInitialised,
        Self::Unexpected,
    ];

    /// Integer value used on the boundary.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode a boundary value. Unknown values map to [`ErrorCode::Unexpected`].
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|code| code.as_i32() == value)
            .unwrap_or(Self::Unexpected)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::ResourceInUse => "resource_in_use",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidState => "invalid_state",
            Self::Pointer => "pointer",
            Self::NotSupported => "not_supported",
            Self::Timeout => "timeout",
            Self::NotInitialised => "not_initialised",
            Self::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Error returned by every fallible participant operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {description}")]
pub struct ParticipantError {
    /// Result code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub description: String,
}

/// Result alias used across the participant crates.
pub type Result<T> = std::result::Result<T, ParticipantError>;

impl ParticipantError {
    /// Create an error with the given code and description.
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, description)
    }

    pub fn resource_in_use(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceInUse, description)
    }

    pub fn invalid_argument(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, description)
    }

    pub fn invalid_state(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, description)
    }

    pub fn pointer(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::Pointer, description)
    }

    pub fn not_supported(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, description)
    }

    pub fn unexpected(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unexpected, description)
    }

    /// Prefix the description with some context, keeping the code.
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self {
            code: self.code,
            description: format!("{}: {}", context, self.description),
        }
    }
}
