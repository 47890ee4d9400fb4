//! The embedding-facing runtime.
//!
//! Every operation the embedding calls goes through [`Runtime`]: promises are
//! addressed by [`Handle`], values are dynamic, and handlers run when the host
//! drains the deferred queue with [`Runtime::run_until_idle`].

use pledge_core::{DeferredQueue, Promise, PromiseState, PromiseWithResolvers};
use std::sync::Arc;

use crate::builder::RuntimeBuilder;
use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;
use crate::lock::{LockKey, LockTable};
use crate::manual::{CompleteOperation, ManualCompletion, ManualTable};
use crate::registry::{Handle, HandleRegistry};
use crate::value::{DynPromise, DynReject, DynResolve, Value, error_reason};

/// Handle-based promise runtime
pub struct Runtime {
    config: RuntimeConfig,
    queue: Arc<DeferredQueue>,
    registry: Arc<HandleRegistry>,
    manual: ManualTable,
    locks: LockTable,
}

impl Runtime {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Create a runtime with `config`
    pub fn with_config(config: RuntimeConfig) -> Self {
        RuntimeBuilder::new().config(config).build()
    }

    /// Start building a runtime
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn from_parts(config: RuntimeConfig, queue: Arc<DeferredQueue>) -> Self {
        Self {
            registry: Arc::new(HandleRegistry::new(config.max_live_handles)),
            config,
            queue,
            manual: ManualTable::new(),
            locks: LockTable::new(),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The deferred queue handlers run on
    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }

    // === Promises ===

    /// Create a promise by running `executor` synchronously and register it.
    pub fn create<F>(&self, executor: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(DynResolve, DynReject) -> Result<(), Value>,
    {
        self.registry.ensure_capacity()?;
        let promise = Promise::new(Arc::clone(&self.queue), executor);
        let handle = self.registry.register(promise)?;
        tracing::debug!(%handle, "created promise");
        Ok(handle)
    }

    /// Register a promise created elsewhere on this runtime's queue
    pub fn register(&self, promise: DynPromise) -> RuntimeResult<Handle> {
        self.registry.register(promise)
    }

    /// Register a fulfillment handler on `handle`.
    ///
    /// Returns the handle of the derived promise, which settles with the
    /// handler's result.
    pub fn then<F>(&self, handle: Handle, on_fulfilled: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        let promise = self.registry.get(handle)?;
        self.registry.ensure_capacity()?;
        self.registry.register(promise.then(on_fulfilled))
    }

    /// Register a fulfillment handler that answers with another handle.
    ///
    /// The derived promise adopts the outcome of the returned handle. A
    /// returned handle that does not resolve rejects the derived promise.
    pub fn then_flat<F>(&self, handle: Handle, on_fulfilled: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(Value) -> Result<Handle, Value> + Send + 'static,
    {
        let promise = self.registry.get(handle)?;
        self.registry.ensure_capacity()?;
        let registry = Arc::clone(&self.registry);
        let derived = promise.then_flat(move |value| {
            let nested = on_fulfilled(value)?;
            registry.get(nested).map_err(|err| error_reason(&err))
        });
        self.registry.register(derived)
    }

    /// Attach the rejection handler of `handle`, replacing any previous one.
    pub fn catch<F>(&self, handle: Handle, on_rejected: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        let promise = self.registry.get(handle)?;
        self.registry.ensure_capacity()?;
        self.registry.register(promise.catch(on_rejected))
    }

    /// Look up the promise behind `handle`
    pub fn promise(&self, handle: Handle) -> RuntimeResult<DynPromise> {
        self.registry.get(handle)
    }

    /// Snapshot the state of `handle`
    pub fn state(&self, handle: Handle) -> RuntimeResult<PromiseState<Value, Value>> {
        Ok(self.registry.get(handle)?.state())
    }

    /// Drop `handle` and its manual completion entry.
    ///
    /// Pending handlers still run; only the handle stops resolving.
    pub fn release(&self, handle: Handle) -> RuntimeResult<()> {
        self.registry.release(handle)?;
        self.manual.remove(handle);
        Ok(())
    }

    /// Number of live handles
    pub fn live_handles(&self) -> usize {
        self.registry.len()
    }

    // === Manual completion ===

    /// Create a promise completed later through [`resolve`](Self::resolve)
    /// or [`reject`](Self::reject).
    ///
    /// `callback` runs synchronously with the new handle, after the handle is
    /// registered. Returning `Err(reason)` rejects the promise.
    pub fn wrapper<F>(&self, callback: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(Handle) -> Result<(), Value>,
    {
        self.wrapper_with(Value::Null, callback)
    }

    /// Like [`wrapper`](Self::wrapper), attaching `data` to the entry.
    pub fn wrapper_with<F>(&self, data: Value, callback: F) -> RuntimeResult<Handle>
    where
        F: FnOnce(Handle) -> Result<(), Value>,
    {
        let PromiseWithResolvers {
            promise,
            resolve,
            reject,
        } = Promise::with_resolvers(Arc::clone(&self.queue));
        let entry = ManualCompletion {
            resolve,
            reject: reject.clone(),
            data,
        };
        let handle = self
            .manual
            .publish(entry, || self.registry.register(promise))?;
        tracing::debug!(%handle, "created manual promise");

        if let Err(reason) = callback(handle) {
            reject(reason);
        }
        Ok(handle)
    }

    /// Fulfill the wrapper promise behind `handle`
    pub fn resolve(&self, handle: Handle, value: Value) -> RuntimeResult<()> {
        self.complete(handle, CompleteOperation::Resolve, value)
    }

    /// Reject the wrapper promise behind `handle`
    pub fn reject(&self, handle: Handle, reason: Value) -> RuntimeResult<()> {
        self.complete(handle, CompleteOperation::Reject, reason)
    }

    /// Complete the wrapper promise behind `handle` with `operation`
    pub fn complete(
        &self,
        handle: Handle,
        operation: CompleteOperation,
        data: Value,
    ) -> RuntimeResult<()> {
        self.registry.get(handle)?;
        self.manual.complete(handle, operation, data)
    }

    /// The data attached by [`wrapper_with`](Self::wrapper_with)
    pub fn manual_data(&self, handle: Handle) -> RuntimeResult<Value> {
        self.registry.get(handle)?;
        self.manual.data(handle)
    }

    // === Locks ===

    /// Create a lock
    pub fn create_lock(&self) -> LockKey {
        self.locks.create()
    }

    /// Block the calling thread until `key` is unblocked
    pub fn block(&self, key: LockKey) -> RuntimeResult<()> {
        self.locks.block(key)
    }

    /// Unblock `key`
    pub fn unblock(&self, key: LockKey) -> RuntimeResult<()> {
        self.locks.unblock(key)
    }

    /// A promise handle that fulfills with the key once `key` is unblocked.
    pub fn when_unblocked(&self, key: LockKey) -> RuntimeResult<Handle> {
        let PromiseWithResolvers {
            promise,
            resolve,
            reject,
        } = Promise::with_resolvers(Arc::clone(&self.queue));
        let handle = self.registry.register(promise)?;
        if let Err(err) = self.locks.wait(key, resolve, reject) {
            self.registry.release(handle)?;
            return Err(err);
        }
        Ok(handle)
    }

    /// Whether `key` has been unblocked
    pub fn is_unblocked(&self, key: LockKey) -> RuntimeResult<bool> {
        self.locks.is_unblocked(key)
    }

    /// Remove `key`, failing anything still waiting on it
    pub fn destroy_lock(&self, key: LockKey) -> RuntimeResult<()> {
        self.locks.destroy(key)
    }

    // === Scheduling ===

    /// Run deferred handlers until none are left.
    ///
    /// Returns the number of tasks run, or the first error met, such as an
    /// unhandled rejection.
    pub fn run_until_idle(&self) -> RuntimeResult<usize> {
        Ok(self.queue.run_until_idle()?)
    }

    /// Whether deferred handlers are waiting to run
    pub fn has_pending_tasks(&self) -> bool {
        !self.queue.is_empty()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .field("locks", &self.locks.len())
            .finish()
    }
}
