//! # Destruction Manager
//!
//! A [`DestructorAccess`] erases how an object on the far side is released:
//! it is a handle plus the far side's release function. A
//! [`DestructionManager`] collects the destructors tied to one proxy and
//! invokes each of them exactly once when the proxy goes away.

use crate::handle::Handle;
use parking_lot::Mutex;
use std::fmt;
use tracing::trace;

/// Release function exported by the side that owns the object.
pub type DestroyFn = unsafe extern "C" fn(handle: Handle);

/// A handle plus the function that releases it.
///
/// `destroy` is `None` for borrowed references, which are never released by
/// the receiving side.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DestructorAccess {
    pub handle: Handle,
    pub destroy: Option<DestroyFn>,
}

impl DestructorAccess {
    /// Destructor of a borrowed reference.
    pub const BORROWED: DestructorAccess = DestructorAccess {
        handle: Handle::NULL,
        destroy: None,
    };

    pub fn new(handle: Handle, destroy: DestroyFn) -> Self {
        Self {
            handle,
            destroy: Some(destroy),
        }
    }

    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        self.destroy.is_none()
    }

    /// Identity of the released object across all loaded binaries.
    #[must_use]
    pub fn key(&self) -> RemoteKey {
        RemoteKey {
            destroy: self.destroy.map_or(0, |destroy| destroy as usize),
            handle: self.handle,
        }
    }

    /// # Safety
    ///
    /// Must be called at most once per registered destructor.
    unsafe fn invoke(self) {
        if let Some(destroy) = self.destroy {
            destroy(self.handle);
        }
    }
}

impl fmt::Debug for DestructorAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestructorAccess")
            .field("handle", &self.handle)
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}

/// Identifies an object exposed by some binary: the handle alone is only
/// unique within the binary that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    destroy: usize,
    handle: Handle,
}

/// Destructors tied to one object's lifetime.
pub struct DestructionManager {
    destructors: Mutex<Vec<DestructorAccess>>,
}

impl DestructionManager {
    pub fn new() -> Self {
        Self {
            destructors: Mutex::new(Vec::new()),
        }
    }

    /// Manager holding a single destructor.
    pub fn with(destructor: DestructorAccess) -> Self {
        let manager = Self::new();
        manager.add(destructor);
        manager
    }

    /// Register a destructor. Borrowed destructors are ignored.
    pub fn add(&self, destructor: DestructorAccess) {
        if !destructor.is_borrowed() {
            self.destructors.lock().push(destructor);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.destructors.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke and forget every registered destructor. Returns how many ran.
    pub fn destroy_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.destructors.lock());
        let count = drained.len();
        for destructor in drained {
            trace!(handle = %destructor.handle, "[Plugin] releasing remote object");
            // SAFETY: drained entries are gone from the list, so each runs once.
            unsafe { destructor.invoke() };
        }
        count
    }
}

impl Default for DestructionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DestructionManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
