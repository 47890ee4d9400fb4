//! Manual completion side table.
//!
//! `wrapper()` promises keep their resolve/reject capabilities here, keyed by
//! the promise's handle, so code that never saw the executor can complete them
//! later.

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::Handle;
use crate::value::{DynReject, DynResolve, Value};

/// Which capability [`ManualTable::complete`] invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompleteOperation {
    /// Fulfill with the data
    Resolve,
    /// Reject with the data
    Reject,
}

/// Capabilities stored for one promise
pub struct ManualCompletion {
    /// Fulfills the promise
    pub resolve: DynResolve,
    /// Rejects the promise
    pub reject: DynReject,
    /// Caller data attached when the entry was created
    pub data: Value,
}

/// Side table of manual completion entries
#[derive(Default)]
pub struct ManualTable {
    entries: Mutex<HashMap<Handle, ManualCompletion>>,
}

impl ManualTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the entry for `handle`
    pub fn insert(&self, handle: Handle, entry: ManualCompletion) {
        self.entries.lock().insert(handle, entry);
    }

    /// Store `entry` under the handle returned by `register`.
    ///
    /// The table stays locked while `register` runs, so a completion racing
    /// the new handle waits for the entry instead of failing with `NotManual`.
    pub fn publish<F>(&self, entry: ManualCompletion, register: F) -> RuntimeResult<Handle>
    where
        F: FnOnce() -> RuntimeResult<Handle>,
    {
        let mut entries = self.entries.lock();
        let handle = register()?;
        entries.insert(handle, entry);
        Ok(handle)
    }

    /// Invoke the capability selected by `operation` with `data`.
    ///
    /// Completing an already settled promise is a no-op.
    pub fn complete(
        &self,
        handle: Handle,
        operation: CompleteOperation,
        data: Value,
    ) -> RuntimeResult<()> {
        // Clone the capability out so it runs without the table locked
        let capability = {
            let entries = self.entries.lock();
            let entry = entries.get(&handle).ok_or(RuntimeError::NotManual(handle))?;
            match operation {
                CompleteOperation::Resolve => Capability::Resolve(entry.resolve.clone()),
                CompleteOperation::Reject => Capability::Reject(entry.reject.clone()),
            }
        };

        tracing::trace!(%handle, ?operation, "manual completion");
        match capability {
            Capability::Resolve(resolve) => resolve(data),
            Capability::Reject(reject) => reject(data),
        }
        Ok(())
    }

    /// Fulfill the promise behind `handle`
    pub fn resolve(&self, handle: Handle, value: Value) -> RuntimeResult<()> {
        self.complete(handle, CompleteOperation::Resolve, value)
    }

    /// Reject the promise behind `handle`
    pub fn reject(&self, handle: Handle, reason: Value) -> RuntimeResult<()> {
        self.complete(handle, CompleteOperation::Reject, reason)
    }

    /// The data attached to `handle`'s entry
    pub fn data(&self, handle: Handle) -> RuntimeResult<Value> {
        self.entries
            .lock()
            .get(&handle)
            .map(|entry| entry.data.clone())
            .ok_or(RuntimeError::NotManual(handle))
    }

    /// Whether `handle` has an entry
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    /// Drop the entry for `handle`, returning whether one existed
    pub fn remove(&self, handle: Handle) -> bool {
        self.entries.lock().remove(&handle).is_some()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Capability {
    Resolve(DynResolve),
    Reject(DynReject),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledge_core::{DeferredQueue, Promise, PromiseState, PromiseWithResolvers};
    use serde_json::json;
    use std::sync::Arc;

    fn entry() -> (ManualCompletion, Promise<Value, Value>) {
        let PromiseWithResolvers {
            promise,
            resolve,
            reject,
        } = Promise::with_resolvers(Arc::new(DeferredQueue::new()));
        (
            ManualCompletion {
                resolve,
                reject,
                data: json!({"tag": "io"}),
            },
            promise,
        )
    }

    #[test]
    fn test_resolve_through_table() {
        let table = ManualTable::new();
        let (entry, promise) = entry();
        let handle = Handle::from_raw(0);
        table.insert(handle, entry);

        table.resolve(handle, json!(42)).unwrap();
        table.reject(handle, json!("ignored")).unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled(json!(42)));
        assert_eq!(table.data(handle).unwrap(), json!({"tag": "io"}));
    }

    #[test]
    fn test_complete_with_operation() {
        let table = ManualTable::new();
        let (entry, promise) = entry();
        let handle = Handle::from_raw(1);
        table.insert(handle, entry);

        table
            .complete(handle, CompleteOperation::Reject, json!("nope"))
            .unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected(json!("nope")));
    }

    #[test]
    fn test_publish_stores_entry_under_registered_handle() {
        let table = ManualTable::new();
        let (entry, promise) = entry();
        let handle = table.publish(entry, || Ok(Handle::from_raw(4))).unwrap();
        assert_eq!(handle, Handle::from_raw(4));

        table.resolve(handle, json!("ok")).unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled(json!("ok")));

        let (entry, _) = self::entry();
        assert!(matches!(
            table.publish(entry, || Err(RuntimeError::RegistryFull(1))),
            Err(RuntimeError::RegistryFull(1))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_entry() {
        let table = ManualTable::new();
        let handle = Handle::from_raw(9);
        assert!(matches!(
            table.resolve(handle, json!(1)),
            Err(RuntimeError::NotManual(h)) if h == handle
        ));

        let (entry, _) = entry();
        table.insert(handle, entry);
        assert!(table.remove(handle));
        assert!(!table.contains(handle));
        assert!(table.is_empty());
    }
}
