//! # Guarded Calls
//!
//! Every wrapper function funnels through [`guarded`], which makes it total:
//!
//! 1. null handle → `InvalidHandle`, nothing called
//! 2. missing output → `InvalidResultPointer`, nothing called
//! 3. unknown or expired handle → `InvalidHandle`
//! 4. panic inside the call → `ExceptionCaught`
//!
//! Outputs are written by the body after the call returned, so a failing
//! call never leaves a partial write behind.

use crate::callbacks::ResultSink;
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::{boundary, InterfaceError};
use crate::handle::{Handle, HandleArena};
use participant_types::{ParticipantError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Resolve `handle` and run `body` on the object, catching panics.
pub fn guarded<T: ?Sized>(
    arena: &HandleArena<T>,
    handle: Handle,
    outputs_valid: bool,
    body: impl FnOnce(Arc<T>),
) -> InterfaceError {
    if handle.is_null() {
        return InterfaceError::InvalidHandle;
    }
    if !outputs_valid {
        return InterfaceError::InvalidResultPointer;
    }
    let Some(object) = arena.resolve(handle) else {
        return InterfaceError::InvalidHandle;
    };
    match panic::catch_unwind(AssertUnwindSafe(move || body(object))) {
        Ok(()) => InterfaceError::None,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(%handle, %message, "[Plugin] call panicked, reporting exception_caught");
            InterfaceError::ExceptionCaught
        }
    }
}

/// [`guarded`] for calls returning a domain result through `sink`.
pub fn guarded_result<T: ?Sized>(
    arena: &HandleArena<T>,
    handle: Handle,
    sink: ResultSink,
    body: impl FnOnce(Arc<T>) -> Result<()>,
) -> InterfaceError {
    guarded(arena, handle, sink.is_valid(), |object| {
        let outcome = body(object);
        // SAFETY: the sink was checked above and the caller keeps its target alive.
        unsafe { sink.deliver(outcome) };
    })
}

/// Proxy side of a call returning a domain result.
pub fn remote_result(call: impl FnOnce(ResultSink) -> InterfaceError) -> Result<()> {
    let mut outcome: Option<ParticipantError> = None;
    let code = call(ResultSink::new(&mut outcome));
    boundary(code)?;
    outcome.map_or(Ok(()), Err)
}

/// [`remote_result`] for a call that hands `destructor` to the far side.
///
/// The far side owns the destructor once its wrapper body ran. If the call
/// was rejected before that, the destructor is run here instead.
pub fn remote_transfer(
    destructor: DestructorAccess,
    call: impl FnOnce(ResultSink) -> InterfaceError,
) -> Result<()> {
    let mut outcome: Option<ParticipantError> = None;
    let code = call(ResultSink::new(&mut outcome));
    if matches!(
        code,
        InterfaceError::InvalidHandle | InterfaceError::InvalidResultPointer
    ) {
        drop(DestructionManager::with(destructor));
    }
    boundary(code)?;
    outcome.map_or(Ok(()), Err)
}

/// Proxy side of a call with no way to report failure: log and continue.
pub fn remote_notify(what: &str, code: InterfaceError) {
    if let Err(code) = code.into_result() {
        warn!(call = what, %code, "[Plugin] remote call failed");
    }
}

/// Run `body`, catching panics, for destructors that take no result.
pub fn guarded_release(handle: Handle, body: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
        error!(%handle, "[Plugin] destructor panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Transfer;
    use participant_types::ErrorCode;

    trait Counter: Send + Sync {
        fn bump(&self) -> Result<u32>;
    }

    struct Failing;

    impl Counter for Failing {
        fn bump(&self) -> Result<u32> {
            Err(ParticipantError::invalid_state("not started"))
        }
    }

    struct Panicking;

    impl Counter for Panicking {
        fn bump(&self) -> Result<u32> {
            panic!("boom")
        }
    }

    #[test]
    fn test_null_handle_checked_first() {
        let arena: HandleArena<dyn Counter> = HandleArena::new();
        let mut called = false;
        let code = guarded(&arena, Handle::NULL, false, |_| called = true);
        assert_eq!(code, InterfaceError::InvalidHandle);
        assert!(!called);
    }

    #[test]
    fn test_missing_output_rejected() {
        let arena: HandleArena<dyn Counter> = HandleArena::new();
        let handle = arena.admit(Transfer::Unique(Box::new(Failing)));
        let code = guarded(&arena, handle, false, |_| {});
        assert_eq!(code, InterfaceError::InvalidResultPointer);
    }

    #[test]
    fn test_unknown_handle_rejected() {
        let arena: HandleArena<dyn Counter> = HandleArena::new();
        let code = guarded(&arena, Handle::from_raw(u64::MAX), true, |_| {});
        assert_eq!(code, InterfaceError::InvalidHandle);
    }

    #[test]
    fn test_panic_becomes_exception_caught() {
        let arena: HandleArena<dyn Counter> = HandleArena::new();
        let handle = arena.admit(Transfer::Unique(Box::new(Panicking)));
        let mut written = None;
        let code = guarded(&arena, handle, true, |counter| {
            written = Some(counter.bump());
        });
        assert_eq!(code, InterfaceError::ExceptionCaught);
        assert!(written.is_none());
    }

    #[test]
    fn test_domain_error_travels_through_sink() {
        let arena: HandleArena<dyn Counter> = HandleArena::new();
        let handle = arena.admit(Transfer::Unique(Box::new(Failing)));
        let result = remote_result(|sink| {
            guarded_result(&arena, handle, sink, |counter| counter.bump().map(|_| ()))
        });
        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
        assert_eq!(err.description, "not started");
    }
}
