//! # Handles and Arenas
//!
//! A [`Handle`] is the opaque token carried by every access structure. It is
//! a key into a [`HandleArena`] that lives on the side which created it. The
//! other side only passes it back; it never interprets it.
//!
//! ## Slots
//!
//! ```text
//! Transfer::Shared(Arc)  → strong slot, released by the far side's destructor
//! Transfer::Unique(Box)  → strong slot, sole owner is the far side
//! Transfer::Weak(Weak)   → weak slot, calls fail once the object is gone
//! lend(&Arc)             → weak slot, released when the BorrowGuard drops
//! ```
//!
//! Weak slots are deduplicated per object: exposing the same object twice
//! yields the same handle with a reference count of two.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque key of an exposed object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ownership discipline of an object handed to the far side.
pub enum Transfer<T: ?Sized> {
    /// One more shared reference; the far side releases it exactly once.
    Shared(Arc<T>),
    /// No lifetime extension; calls fail once the object is dropped.
    Weak(Weak<T>),
    /// Exclusive ownership moves to the far side.
    Unique(Box<T>),
}

enum Slot<T: ?Sized> {
    Strong(Arc<T>),
    Weak(Weak<T>),
}

impl<T: ?Sized> Slot<T> {
    fn resolve(&self) -> Option<Arc<T>> {
        match self {
            Slot::Strong(object) => Some(Arc::clone(object)),
            Slot::Weak(object) => object.upgrade(),
        }
    }

    fn is_weak_of(&self, object: &Weak<T>) -> bool {
        matches!(self, Slot::Weak(existing) if existing.ptr_eq(object))
    }
}

struct Entry<T: ?Sized> {
    slot: Slot<T>,
    refs: usize,
}

/// Process-local table of exposed objects of one interface.
pub struct HandleArena<T: ?Sized> {
    entries: Mutex<HashMap<Handle, Entry<T>>>,
}

impl<T: ?Sized> HandleArena<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store an object according to its transfer discipline.
    pub fn admit(&self, transfer: Transfer<T>) -> Handle {
        match transfer {
            Transfer::Shared(object) => self.insert(Slot::Strong(object)),
            Transfer::Unique(object) => self.insert(Slot::Strong(Arc::from(object))),
            Transfer::Weak(object) => self.insert_weak(&object),
        }
    }

    fn insert(&self, slot: Slot<T>) -> Handle {
        let handle = Handle::next();
        self.entries.lock().insert(handle, Entry { slot, refs: 1 });
        handle
    }

    fn insert_weak(&self, object: &Weak<T>) -> Handle {
        let mut entries = self.entries.lock();
        if let Some((handle, entry)) = entries
            .iter_mut()
            .find(|(_, entry)| entry.slot.is_weak_of(object))
        {
            entry.refs += 1;
            return *handle;
        }
        let handle = Handle::next();
        entries.insert(
            handle,
            Entry {
                slot: Slot::Weak(object.clone()),
                refs: 1,
            },
        );
        handle
    }

    /// Handle of an already exposed weak object.
    pub fn find_weak(&self, object: &Weak<T>) -> Option<Handle> {
        self.entries
            .lock()
            .iter()
            .find(|(_, entry)| entry.slot.is_weak_of(object))
            .map(|(handle, _)| *handle)
    }

    /// Live object behind `handle`. `None` for unknown handles and for weak
    /// slots whose object is gone.
    pub fn resolve(&self, handle: Handle) -> Option<Arc<T>> {
        self.entries.lock().get(&handle)?.slot.resolve()
    }

    /// Drop one reference. Returns `false` for an unknown handle.
    pub fn release(&self, handle: Handle) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&handle) else {
                return false;
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                return true;
            }
            entries.remove(&handle)
        };
        // The object may own proxies whose destructors reenter an arena.
        drop(removed);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> HandleArena<T> {
    /// Weak slot for the duration of a [`BorrowGuard`].
    pub fn lend(&'static self, object: &Arc<T>) -> BorrowGuard<T> {
        let handle = self.insert_weak(&Arc::downgrade(object));
        BorrowGuard {
            arena: self,
            handle,
        }
    }
}

impl<T: ?Sized> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a lent handle valid; releases it on drop.
pub struct BorrowGuard<T: ?Sized + 'static> {
    arena: &'static HandleArena<T>,
    handle: Handle,
}

impl<T: ?Sized + 'static> BorrowGuard<T> {
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T: ?Sized + 'static> Drop for BorrowGuard<T> {
    fn drop(&mut self) {
        self.arena.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> &str {
            self.0
        }
    }

    lazy_static! {
        static ref LENT: HandleArena<dyn Named> = HandleArena::new();
    }

    #[test]
    fn test_shared_slot_keeps_object_alive() {
        let arena: HandleArena<dyn Named> = HandleArena::new();
        let object: Arc<dyn Named> = Arc::new(Fixed("a"));
        let handle = arena.admit(Transfer::Shared(Arc::clone(&object)));

        assert_eq!(Arc::strong_count(&object), 2);
        assert_eq!(arena.resolve(handle).map(|o| o.name().to_string()), Some("a".into()));

        assert!(arena.release(handle));
        assert_eq!(Arc::strong_count(&object), 1);
        assert!(arena.resolve(handle).is_none());
        assert!(!arena.release(handle));
    }

    #[test]
    fn test_weak_slot_fails_after_drop() {
        let arena: HandleArena<dyn Named> = HandleArena::new();
        let object: Arc<dyn Named> = Arc::new(Fixed("b"));
        let handle = arena.admit(Transfer::Weak(Arc::downgrade(&object)));

        assert!(arena.resolve(handle).is_some());
        drop(object);
        assert!(arena.resolve(handle).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_weak_slots_are_deduplicated() {
        let arena: HandleArena<dyn Named> = HandleArena::new();
        let object: Arc<dyn Named> = Arc::new(Fixed("c"));
        let first = arena.admit(Transfer::Weak(Arc::downgrade(&object)));
        let second = arena.admit(Transfer::Weak(Arc::downgrade(&object)));

        assert_eq!(first, second);
        assert_eq!(arena.find_weak(&Arc::downgrade(&object)), Some(first));
        assert!(arena.release(first));
        assert_eq!(arena.len(), 1);
        assert!(arena.release(first));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_borrow_guard_releases_on_drop() {
        let object: Arc<dyn Named> = Arc::new(Fixed("d"));
        let guard = LENT.lend(&object);
        let handle = guard.handle();

        assert!(!handle.is_null());
        assert!(LENT.resolve(handle).is_some());
        drop(guard);
        assert!(LENT.resolve(handle).is_none());
    }

    #[test]
    fn test_unique_slot_owns_object() {
        let arena: HandleArena<dyn Named> = HandleArena::new();
        let handle = arena.admit(Transfer::Unique(Box::new(Fixed("e"))));
        assert_eq!(arena.resolve(handle).map(|o| o.name().to_string()), Some("e".into()));
        assert!(arena.release(handle));
        assert!(arena.is_empty());
    }
}
