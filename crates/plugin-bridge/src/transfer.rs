//! # Ownership Transfer Records
//!
//! The receiving half of a weak transfer. The receiver must hand its local
//! API a `Weak<dyn X>`, so something has to own the proxy the weak points
//! to. [`ProxyKeeper`] is that owner: it pairs the proxy (and with it the
//! far side's destructor) with the local object that received it.
//!
//! Entries leave the keeper when:
//!
//! - the receiver unregisters the sink explicitly,
//! - the receiving object itself is released (`release_owner`), or
//! - the far side reported the referenced object as gone (`purge_expired`).

use crate::destruction::RemoteKey;
use crate::handle::Handle;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Keeps a loaded binary mapped while objects from it are in use.
///
/// Proxies declare it as their last field so the binary outlives the
/// destructor calls made when the proxy drops.
#[derive(Clone)]
pub struct SharedBinary(Arc<dyn Any + Send + Sync>);

impl SharedBinary {
    pub fn new<T: Any + Send + Sync>(binary: T) -> Self {
        Self(Arc::new(binary))
    }

    /// Number of holders of this binary.
    #[must_use]
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for SharedBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBinary")
            .field("holders", &self.holders())
            .finish()
    }
}

/// A proxy that can learn its far-side object is gone.
pub trait Expiring {
    fn is_expired(&self) -> bool;
}

type KeeperKey = (Handle, RemoteKey);

/// Owner of proxies received through weak transfers.
pub struct ProxyKeeper<P> {
    proxies: Mutex<HashMap<KeeperKey, Arc<P>>>,
}

impl<P: Expiring> ProxyKeeper<P> {
    pub fn new() -> Self {
        Self {
            proxies: Mutex::new(HashMap::new()),
        }
    }

    /// Keep `proxy` for `owner`. If the same remote object is already kept
    /// for this owner, the existing proxy is returned and `proxy` dropped.
    pub fn keep(&self, owner: Handle, key: RemoteKey, proxy: P) -> Arc<P> {
        self.purge_expired();
        let (kept, duplicate) = {
            let mut proxies = self.proxies.lock();
            match proxies.get(&(owner, key)) {
                Some(existing) => (Arc::clone(existing), Some(proxy)),
                None => {
                    let proxy = Arc::new(proxy);
                    proxies.insert((owner, key), Arc::clone(&proxy));
                    (proxy, None)
                }
            }
        };
        drop(duplicate);
        kept
    }

    /// Keep `proxy` as the only proxy of `owner`.
    pub fn replace(&self, owner: Handle, key: RemoteKey, proxy: P) -> Arc<P> {
        self.release_owner(owner);
        self.keep(owner, key, proxy)
    }

    /// Stop keeping one proxy. The proxy is returned so the caller decides
    /// when it drops.
    pub fn release(&self, owner: Handle, key: RemoteKey) -> Option<Arc<P>> {
        self.proxies.lock().remove(&(owner, key))
    }

    /// Drop every proxy kept for `owner`.
    pub fn release_owner(&self, owner: Handle) {
        let released: Vec<Arc<P>> = {
            let mut proxies = self.proxies.lock();
            let keys: Vec<KeeperKey> = proxies
                .keys()
                .filter(|(kept_for, _)| *kept_for == owner)
                .copied()
                .collect();
            keys.iter().filter_map(|key| proxies.remove(key)).collect()
        };
        drop(released);
    }

    /// Drop every proxy whose far-side object is gone.
    pub fn purge_expired(&self) {
        let expired: Vec<Arc<P>> = {
            let mut proxies = self.proxies.lock();
            let keys: Vec<KeeperKey> = proxies
                .iter()
                .filter(|(_, proxy)| proxy.is_expired())
                .map(|(key, _)| *key)
                .collect();
            keys.iter().filter_map(|key| proxies.remove(key)).collect()
        };
        drop(expired);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: Expiring> Default for ProxyKeeper<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destruction::DestructorAccess;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    static DROPPED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn release_nothing(_handle: Handle) {}

    struct Probe {
        expired: AtomicBool,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                expired: AtomicBool::new(false),
            }
        }
    }

    impl Expiring for Probe {
        fn is_expired(&self) -> bool {
            self.expired.load(Ordering::SeqCst)
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            DROPPED.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn key(raw: u64) -> RemoteKey {
        DestructorAccess::new(Handle::from_raw(raw), release_nothing).key()
    }

    #[test]
    fn test_keeper_lifecycle() {
        DROPPED.store(0, Ordering::SeqCst);
        let keeper = ProxyKeeper::new();
        let owner = Handle::from_raw(7);

        let first = keeper.keep(owner, key(1), Probe::new());
        let again = keeper.keep(owner, key(1), Probe::new());
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(DROPPED.load(Ordering::SeqCst), 1);

        keeper.keep(owner, key(2), Probe::new());
        keeper.keep(Handle::from_raw(8), key(3), Probe::new());
        assert_eq!(keeper.len(), 3);

        first.expired.store(true, Ordering::SeqCst);
        drop((first, again));
        keeper.purge_expired();
        assert_eq!(keeper.len(), 2);

        keeper.release_owner(owner);
        assert_eq!(keeper.len(), 1);
        assert!(keeper.release(Handle::from_raw(8), key(3)).is_some());
        assert!(keeper.is_empty());
        assert_eq!(DROPPED.load(Ordering::SeqCst), 4);
    }
}
