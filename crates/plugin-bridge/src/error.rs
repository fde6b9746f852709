//! # Boundary Errors
//!
//! [`InterfaceError`] only describes the mechanics of a crossing call. Domain
//! failures travel separately through a [`crate::ResultSink`].

use participant_types::{ErrorCode, ParticipantError};
use thiserror::Error;

/// Result of every `extern "C"` wrapper function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum InterfaceError {
    #[error("no error")]
    None = 0,
    #[error("invalid handle")]
    InvalidHandle = 1,
    #[error("invalid result pointer")]
    InvalidResultPointer = 2,
    #[error("exception caught")]
    ExceptionCaught = 3,
}

impl InterfaceError {
    #[must_use]
    pub fn is_none(self) -> bool {
        self == InterfaceError::None
    }

    /// `Ok` for [`InterfaceError::None`], the code itself otherwise.
    pub fn into_result(self) -> std::result::Result<(), InterfaceError> {
        if self.is_none() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<InterfaceError> for ParticipantError {
    fn from(error: InterfaceError) -> Self {
        let code = match error {
            InterfaceError::None => ErrorCode::Unexpected,
            InterfaceError::InvalidHandle | InterfaceError::InvalidResultPointer => {
                ErrorCode::Pointer
            }
            InterfaceError::ExceptionCaught => ErrorCode::Unexpected,
        };
        ParticipantError::new(code, format!("boundary call failed: {}", error))
    }
}

/// Turn a boundary code into a domain result.
pub fn boundary(code: InterfaceError) -> participant_types::Result<()> {
    code.into_result().map_err(ParticipantError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_mapping() {
        assert!(boundary(InterfaceError::None).is_ok());

        let err = boundary(InterfaceError::InvalidHandle).unwrap_err();
        assert_eq!(err.code, ErrorCode::Pointer);

        let err = boundary(InterfaceError::ExceptionCaught).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unexpected);
        assert!(err.description.contains("exception caught"));
    }
}
