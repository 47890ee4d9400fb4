//! Deferred execution queue for promise notifications.
//!
//! ## Ordering Guarantees
//!
//! - Nothing runs inline with `enqueue`; tasks only run from a drain
//! - FIFO: first queued, first executed
//! - A drain runs until the queue is empty, so tasks queued by other tasks
//!   run in the same drain
//!
//! ## Error Handling
//!
//! - Errors returned by tasks are logged and the first one is returned
//! - Remaining tasks continue to execute even after an error
//! - Under [`UnhandledRejectionPolicy::Panic`] an unhandled rejection aborts
//!   the drain with a panic instead

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{PromiseError, PromiseResult};

/// Deferred task type
pub type DeferredTask = Box<dyn FnOnce() -> PromiseResult<()> + Send>;

/// What a drain does when it meets an unhandled rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledRejectionPolicy {
    /// Log it and return it from [`DeferredQueue::run_until_idle`]
    #[default]
    Report,
    /// Log it and panic
    Panic,
}

/// Queue of deferred tasks
pub struct DeferredQueue {
    tasks: Mutex<VecDeque<DeferredTask>>,
    len: AtomicUsize,
    policy: UnhandledRejectionPolicy,
    max_tasks: usize,
}

impl DeferredQueue {
    /// Create new empty queue with the default policy and no drain budget
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            policy: UnhandledRejectionPolicy::default(),
            max_tasks: 0,
        }
    }

    /// Set the unhandled rejection policy
    pub fn with_policy(mut self, policy: UnhandledRejectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Limit how many tasks one drain may run. `0` means unlimited.
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// The unhandled rejection policy of this queue
    pub fn policy(&self) -> UnhandledRejectionPolicy {
        self.policy
    }

    /// Add a task to the queue
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() -> PromiseResult<()> + Send + 'static,
    {
        self.tasks.lock().push_back(Box::new(task));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next task
    pub fn dequeue(&self) -> Option<DeferredTask> {
        let task = self.tasks.lock().pop_front();
        if task.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        task
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run tasks until the queue is empty.
    ///
    /// Returns the number of tasks that ran, or the first error met.
    pub fn run_until_idle(&self) -> PromiseResult<usize> {
        let mut ran = 0usize;
        let mut first_error = None;

        loop {
            if self.max_tasks != 0 && ran >= self.max_tasks && !self.is_empty() {
                tracing::warn!(
                    limit = self.max_tasks,
                    pending = self.len(),
                    "deferred queue drain budget exhausted"
                );
                first_error.get_or_insert(PromiseError::DrainLimitExceeded {
                    limit: self.max_tasks,
                });
                break;
            }

            let Some(task) = self.dequeue() else {
                break;
            };
            ran += 1;

            if let Err(err) = task() {
                tracing::error!("{}", err);
                if err.is_unhandled_rejection() && self.policy == UnhandledRejectionPolicy::Panic {
                    panic!("{}", err);
                }
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.len())
            .field("policy", &self.policy)
            .field("max_tasks", &self.max_tasks)
            .finish()
    }
}
