//! Keyed signal locks.
//!
//! A lock is a one-way flag: `unblock` opens it and it stays open. Waiting
//! comes in two forms:
//!
//! - [`LockTable::block`] parks the calling thread on a condition variable
//!   until another thread calls `unblock`. Calling it on the only thread that
//!   could unblock the lock never returns.
//! - [`LockTable::wait`] registers a promise capability that is resolved by
//!   `unblock`, so a single cooperative thread can suspend through the
//!   deferred queue instead.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{DynReject, DynResolve, Value};

/// Lock identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(u64);

impl LockKey {
    /// Wrap a raw key received from the embedding
    pub const fn from_raw(key: u64) -> Self {
        Self(key)
    }

    /// The raw key
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

#[derive(Default)]
struct LockState {
    /// `None` until the first wait, `Some(true)` once unblocked
    flag: Option<bool>,
    waiters: Vec<(DynResolve, DynReject)>,
}

/// Table of signal locks
pub struct LockTable {
    locks: Mutex<HashMap<LockKey, LockState>>,
    signal: Condvar,
    next_key: AtomicU64,
}

impl LockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            signal: Condvar::new(),
            next_key: AtomicU64::new(0),
        }
    }

    /// Create a lock with an unset flag
    pub fn create(&self) -> LockKey {
        let key = LockKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        self.locks.lock().insert(key, LockState::default());
        tracing::debug!(%key, "created lock");
        key
    }

    /// Block the current thread until `key` is unblocked.
    ///
    /// Returns immediately if `unblock` already ran. Fails if the lock does
    /// not exist or is destroyed while waiting.
    pub fn block(&self, key: LockKey) -> RuntimeResult<()> {
        let mut locks = self.locks.lock();
        loop {
            let state = locks.get_mut(&key).ok_or(RuntimeError::UnknownLock(key))?;
            if *state.flag.get_or_insert(false) {
                return Ok(());
            }
            tracing::trace!(%key, "blocking on lock");
            self.signal.wait(&mut locks);
        }
    }

    /// Open `key`, waking blocked threads and resolving cooperative waiters.
    pub fn unblock(&self, key: LockKey) -> RuntimeResult<()> {
        let waiters = {
            let mut locks = self.locks.lock();
            let state = locks.get_mut(&key).ok_or(RuntimeError::UnknownLock(key))?;
            state.flag = Some(true);
            std::mem::take(&mut state.waiters)
        };
        self.signal.notify_all();

        tracing::debug!(%key, waiters = waiters.len(), "unblocked lock");
        for (resolve, _) in waiters {
            resolve(Value::from(key.0));
        }
        Ok(())
    }

    /// Resolve `resolve` once `key` is unblocked.
    ///
    /// An already unblocked lock resolves right away; the promise's handlers
    /// still run from the deferred queue.
    pub fn wait(&self, key: LockKey, resolve: DynResolve, reject: DynReject) -> RuntimeResult<()> {
        let ready = {
            let mut locks = self.locks.lock();
            let state = locks.get_mut(&key).ok_or(RuntimeError::UnknownLock(key))?;
            let ready = *state.flag.get_or_insert(false);
            if !ready {
                state.waiters.push((resolve.clone(), reject));
            }
            ready
        };

        if ready {
            resolve(Value::from(key.0));
        }
        Ok(())
    }

    /// Whether `key` has been unblocked
    pub fn is_unblocked(&self, key: LockKey) -> RuntimeResult<bool> {
        self.locks
            .lock()
            .get(&key)
            .map(|state| state.flag == Some(true))
            .ok_or(RuntimeError::UnknownLock(key))
    }

    /// Remove `key`.
    ///
    /// Blocked threads return [`RuntimeError::UnknownLock`] and cooperative
    /// waiters are rejected.
    pub fn destroy(&self, key: LockKey) -> RuntimeResult<()> {
        let state = self
            .locks
            .lock()
            .remove(&key)
            .ok_or(RuntimeError::UnknownLock(key))?;
        self.signal.notify_all();

        tracing::debug!(%key, waiters = state.waiters.len(), "destroyed lock");
        let reason = Value::String(format!("{} was destroyed", key));
        for (_, reject) in state.waiters {
            reject(reason.clone());
        }
        Ok(())
    }

    /// Number of existing locks
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Check if no lock exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
