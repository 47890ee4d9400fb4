//! Handle registry mapping integer handles to promises.
//!
//! Handles are issued sequentially from 0 and never reused. An entry stays
//! alive until it is released, after which its handle is reported as stale
//! instead of silently resolving to something else.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::DynPromise;

/// Opaque promise handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Wrap a raw id received from the embedding
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw id
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of live promises
pub struct HandleRegistry {
    entries: Mutex<HashMap<Handle, DynPromise>>,
    next_id: AtomicU64,
    max_live: Option<usize>,
}

impl HandleRegistry {
    /// Create an empty registry, optionally bounding the live entry count
    pub fn new(max_live: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            max_live,
        }
    }

    /// Fail with [`RuntimeError::RegistryFull`] if no entry can be added
    pub fn ensure_capacity(&self) -> RuntimeResult<()> {
        match self.max_live {
            Some(limit) if self.entries.lock().len() >= limit => {
                Err(RuntimeError::RegistryFull(limit))
            }
            _ => Ok(()),
        }
    }

    /// Store a promise and return its new handle
    pub fn register(&self, promise: DynPromise) -> RuntimeResult<Handle> {
        let mut entries = self.entries.lock();
        if let Some(limit) = self.max_live {
            if entries.len() >= limit {
                return Err(RuntimeError::RegistryFull(limit));
            }
        }
        let handle = Handle(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.insert(handle, promise);
        tracing::trace!(%handle, live = entries.len(), "registered promise");
        Ok(handle)
    }

    /// Look up a promise by handle
    pub fn get(&self, handle: Handle) -> RuntimeResult<DynPromise> {
        self.entries
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| self.missing(handle))
    }

    /// Remove a promise from the registry.
    ///
    /// The promise keeps working for anyone still holding it; only the handle
    /// stops resolving.
    pub fn release(&self, handle: Handle) -> RuntimeResult<DynPromise> {
        let removed = self.entries.lock().remove(&handle);
        match removed {
            Some(promise) => {
                tracing::debug!(%handle, "released promise handle");
                Ok(promise)
            }
            None => Err(self.missing(handle)),
        }
    }

    /// Whether `handle` currently resolves
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no handle is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of handles issued so far, released ones included
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    fn missing(&self, handle: Handle) -> RuntimeError {
        if handle.0 < self.issued() {
            RuntimeError::ReleasedHandle(handle)
        } else {
            RuntimeError::UnknownHandle(handle)
        }
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.len())
            .field("issued", &self.issued())
            .field("max_live", &self.max_live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledge_core::{DeferredQueue, Promise};
    use std::sync::Arc;

    fn promise() -> DynPromise {
        Promise::pending(Arc::new(DeferredQueue::new()))
    }

    #[test]
    fn test_handles_are_sequential() {
        let registry = HandleRegistry::new(None);
        let a = registry.register(promise()).unwrap();
        let b = registry.register(promise()).unwrap();
        assert_eq!(a.as_u64(), 0);
        assert_eq!(b.as_u64(), 1);
        assert!(a < b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_returns_same_instance() {
        let registry = HandleRegistry::new(None);
        let original = promise();
        let handle = registry.register(original.clone()).unwrap();
        assert!(registry.get(handle).unwrap().ptr_eq(&original));
        assert!(registry.get(handle).unwrap().ptr_eq(&original));
    }

    #[test]
    fn test_unknown_and_released_handles() {
        let registry = HandleRegistry::new(None);
        let handle = registry.register(promise()).unwrap();

        assert!(matches!(
            registry.get(Handle::from_raw(5)),
            Err(RuntimeError::UnknownHandle(h)) if h.as_u64() == 5
        ));

        registry.release(handle).unwrap();
        assert!(!registry.contains(handle));
        assert!(matches!(
            registry.get(handle),
            Err(RuntimeError::ReleasedHandle(h)) if h == handle
        ));
        assert!(matches!(
            registry.release(handle),
            Err(RuntimeError::ReleasedHandle(_))
        ));

        // Released ids are never handed out again
        let next = registry.register(promise()).unwrap();
        assert_eq!(next.as_u64(), 1);
        assert_eq!(registry.issued(), 2);
    }

    #[test]
    fn test_capacity_limit() {
        let registry = HandleRegistry::new(Some(1));
        let handle = registry.register(promise()).unwrap();
        assert!(matches!(
            registry.ensure_capacity(),
            Err(RuntimeError::RegistryFull(1))
        ));
        assert!(matches!(
            registry.register(promise()),
            Err(RuntimeError::RegistryFull(1))
        ));

        registry.release(handle).unwrap();
        assert!(registry.ensure_capacity().is_ok());
        assert!(registry.register(promise()).is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(Handle::from_raw(3).to_string(), "#3");
    }
}
