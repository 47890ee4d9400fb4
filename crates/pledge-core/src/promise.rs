//! Settle-once promises with deferred continuations.
//!
//! A [`Promise`] is a cheaply clonable handle to shared state. Settlement is
//! one-way (`Pending` to `Fulfilled` or `Rejected`) and the first settlement
//! wins. Handlers never run inline: settling enqueues one notification task on
//! the [`DeferredQueue`] and registering on an already notified promise
//! enqueues the handler itself, so every handler runs from a queue drain.
//!
//! ## Rust API
//!
//! ```ignore
//! let queue = Arc::new(DeferredQueue::new());
//! let promise = Promise::<i32, String>::new(queue.clone(), |resolve, _reject| {
//!     resolve(20);
//!     Ok(())
//! });
//! let doubled = promise.then(|v| Ok(v * 2));
//! queue.run_until_idle()?;
//! assert_eq!(doubled.state(), PromiseState::Fulfilled(40));
//! ```
//!
//! ## Rejection handling
//!
//! Fulfillment handlers and adopting promises share one list and run in the
//! order they were registered. Rejection handlers do not: a promise has a
//! single rejection slot and attaching a new handler replaces the previous
//! one. On rejection the slot runs first, then the adopters in order. A
//! rejection that finds neither a rejection handler nor an adopting promise
//! when its notification runs fails the drain with
//! [`PromiseError::UnhandledRejection`].

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::{PromiseError, PromiseResult};
use crate::queue::DeferredQueue;

/// Promise state
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<T, E> {
    /// Not yet settled
    Pending,
    /// Resolved with value
    Fulfilled(T),
    /// Rejected with reason
    Rejected(E),
}

impl<T, E> PromiseState<T, E> {
    /// Check if still pending
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    /// Check if settled (fulfilled or rejected)
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }
}

impl<T: Clone, E: Clone> PromiseState<T, E> {
    /// The settled outcome, if any
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

/// Capability that fulfills the promise it was created for
pub type ResolveFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Capability that rejects the promise it was created for
pub type RejectFn<E> = Arc<dyn Fn(E) + Send + Sync>;

type FulfillHandler<T> = Box<dyn FnOnce(T) + Send>;
type RejectHandler<E> = Box<dyn FnOnce(E) + Send>;
type Adopter<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Something waiting on the outcome, kept in registration order
enum Reaction<T, E> {
    /// `then` handler, fulfillment only
    Fulfill(FulfillHandler<T>),
    /// A promise following this one (flattening)
    Adopt(Adopter<T, E>),
}

struct Inner<T, E> {
    state: PromiseState<T, E>,
    /// Fulfillment handlers and adopters
    reactions: Vec<Reaction<T, E>>,
    /// The single rejection slot
    rejection_handler: Option<RejectHandler<E>>,
    /// Rust futures waiting in `settled()`
    wakers: Vec<Waker>,
    /// Set once the settlement notification has run
    notified: bool,
}

/// A settle-once promise
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    queue: Arc<DeferredQueue>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        match &inner.state {
            PromiseState::Pending => write!(f, "Promise {{ <pending> }}"),
            PromiseState::Fulfilled(v) => write!(f, "Promise {{ <fulfilled>: {:?} }}", v),
            PromiseState::Rejected(e) => write!(f, "Promise {{ <rejected>: {:?} }}", e),
        }
    }
}

/// Result of [`Promise::with_resolvers`]
///
/// Provides a promise along with its resolve and reject capabilities for
/// manual control.
pub struct PromiseWithResolvers<T, E> {
    /// The promise
    pub promise: Promise<T, E>,
    /// Function to resolve the promise
    pub resolve: ResolveFn<T>,
    /// Function to reject the promise
    pub reject: RejectFn<E>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + fmt::Display + Send + 'static,
{
    /// Create a promise and run `executor` synchronously.
    ///
    /// The executor receives the resolve and reject capabilities. Returning
    /// `Err(reason)` rejects the promise unless it already settled.
    pub fn new<F>(queue: Arc<DeferredQueue>, executor: F) -> Self
    where
        F: FnOnce(ResolveFn<T>, RejectFn<E>) -> Result<(), E>,
    {
        let PromiseWithResolvers {
            promise,
            resolve,
            reject,
        } = Self::with_resolvers(queue);

        if let Err(reason) = executor(resolve, reject) {
            tracing::trace!("executor failed, rejecting promise");
            promise.settle(Err(reason));
        }
        promise
    }

    /// Create a new pending promise
    pub fn pending(queue: Arc<DeferredQueue>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PromiseState::Pending,
                reactions: Vec::new(),
                rejection_handler: None,
                wakers: Vec::new(),
                notified: false,
            })),
            queue,
        }
    }

    /// Create a pending promise together with its capabilities
    pub fn with_resolvers(queue: Arc<DeferredQueue>) -> PromiseWithResolvers<T, E> {
        let promise = Self::pending(queue);

        let resolve = {
            let p = promise.clone();
            Arc::new(move |value: T| {
                p.settle(Ok(value));
            }) as ResolveFn<T>
        };

        let reject = {
            let p = promise.clone();
            Arc::new(move |reason: E| {
                p.settle(Err(reason));
            }) as RejectFn<E>
        };

        PromiseWithResolvers {
            promise,
            resolve,
            reject,
        }
    }

    /// Create a promise that is already fulfilled
    pub fn resolved(queue: Arc<DeferredQueue>, value: T) -> Self {
        let promise = Self::pending(queue);
        promise.settle(Ok(value));
        promise
    }

    /// Create a promise that is already rejected.
    ///
    /// Attach a rejection handler before the next drain, or the drain reports
    /// it as unhandled.
    pub fn rejected(queue: Arc<DeferredQueue>, reason: E) -> Self {
        let promise = Self::pending(queue);
        promise.settle(Err(reason));
        promise
    }

    /// Get current state
    pub fn state(&self) -> PromiseState<T, E> {
        self.inner.lock().state.clone()
    }

    /// Check if still pending
    pub fn is_pending(&self) -> bool {
        self.inner.lock().state.is_pending()
    }

    /// Check if settled
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The queue this promise schedules its handlers on
    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }

    /// Whether two handles refer to the same promise
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Settle with `outcome` unless already settled.
    ///
    /// Returns `false` when the promise was already settled.
    fn settle(&self, outcome: Result<T, E>) -> bool {
        let wakers = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                tracing::trace!("ignoring settlement of an already settled promise");
                return false;
            }
            inner.state = match outcome {
                Ok(value) => PromiseState::Fulfilled(value),
                Err(reason) => PromiseState::Rejected(reason),
            };
            std::mem::take(&mut inner.wakers)
        };

        for waker in wakers {
            waker.wake();
        }

        let this = self.clone();
        self.queue.enqueue(move || this.notify());
        true
    }

    /// Deliver the settled outcome to everything registered so far
    fn notify(&self) -> PromiseResult<()> {
        let (state, reactions, rejection_handler) = {
            let mut inner = self.inner.lock();
            inner.notified = true;
            (
                inner.state.clone(),
                std::mem::take(&mut inner.reactions),
                inner.rejection_handler.take(),
            )
        };

        match state {
            PromiseState::Pending => Ok(()),
            PromiseState::Fulfilled(value) => {
                tracing::trace!(reactions = reactions.len(), "promise fulfilled");
                for reaction in reactions {
                    match reaction {
                        Reaction::Fulfill(handler) => handler(value.clone()),
                        Reaction::Adopt(adopter) => adopter(Ok(value.clone())),
                    }
                }
                Ok(())
            }
            PromiseState::Rejected(reason) => {
                let adopters: Vec<_> = reactions
                    .into_iter()
                    .filter_map(|reaction| match reaction {
                        Reaction::Adopt(adopter) => Some(adopter),
                        Reaction::Fulfill(_) => None,
                    })
                    .collect();
                let handled = rejection_handler.is_some() || !adopters.is_empty();
                if let Some(handler) = rejection_handler {
                    handler(reason.clone());
                }
                for adopter in adopters {
                    adopter(Err(reason.clone()));
                }
                if handled {
                    Ok(())
                } else {
                    Err(PromiseError::unhandled(&reason))
                }
            }
        }
    }

    fn on_fulfilled(&self, handler: FulfillHandler<T>) {
        let value = {
            let mut inner = self.inner.lock();
            if !inner.notified {
                inner.reactions.push(Reaction::Fulfill(handler));
                return;
            }
            match &inner.state {
                PromiseState::Fulfilled(value) => value.clone(),
                _ => return,
            }
        };

        self.queue.enqueue(move || {
            handler(value);
            Ok(())
        });
    }

    fn on_rejected(&self, handler: RejectHandler<E>) {
        let reason = {
            let mut inner = self.inner.lock();
            let replaced = inner.rejection_handler.replace(handler).is_some();
            if replaced {
                tracing::trace!("replacing previously attached rejection handler");
            }
            if !inner.notified {
                return;
            }
            let reason = match &inner.state {
                PromiseState::Rejected(reason) => Some(reason.clone()),
                _ => None,
            };
            match reason {
                Some(reason) => reason,
                None => {
                    inner.rejection_handler = None;
                    return;
                }
            }
        };

        // The slot is read when the task runs, so a later attachment in the
        // same turn still replaces this one.
        let this = self.clone();
        self.queue.enqueue(move || {
            let handler = this.inner.lock().rejection_handler.take();
            if let Some(handler) = handler {
                handler(reason);
            }
            Ok(())
        });
    }

    fn observe(&self, adopter: Adopter<T, E>) {
        let outcome = {
            let mut inner = self.inner.lock();
            if !inner.notified {
                inner.reactions.push(Reaction::Adopt(adopter));
                return;
            }
            match inner.state.outcome() {
                Some(outcome) => outcome,
                None => return,
            }
        };

        self.queue.enqueue(move || {
            adopter(outcome);
            Ok(())
        });
    }

    /// Register a fulfillment handler.
    ///
    /// The returned promise settles with the handler's result: `Ok` fulfills
    /// it and `Err` rejects it. If this promise rejects, the returned promise
    /// stays pending.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let derived = Promise::pending(Arc::clone(&self.queue));
        let target = derived.clone();
        self.on_fulfilled(Box::new(move |value| {
            target.settle(on_fulfilled(value));
        }));
        derived
    }

    /// Register a fulfillment handler that returns another promise.
    ///
    /// The returned promise follows the nested promise and settles with its
    /// eventual outcome.
    pub fn then_flat<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<U, E>, E> + Send + 'static,
    {
        let derived = Promise::pending(Arc::clone(&self.queue));
        let target = derived.clone();
        self.on_fulfilled(Box::new(move |value| match on_fulfilled(value) {
            Ok(nested) => nested.forward_to(target),
            Err(reason) => {
                target.settle(Err(reason));
            }
        }));
        derived
    }

    /// Attach the rejection handler, replacing any previous one.
    ///
    /// The returned promise settles with the handler's result. If this
    /// promise fulfills, the returned promise stays pending.
    pub fn catch<U, F>(&self, on_rejected: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(E) -> Result<U, E> + Send + 'static,
    {
        let derived = Promise::pending(Arc::clone(&self.queue));
        let target = derived.clone();
        self.on_rejected(Box::new(move |reason| {
            target.settle(on_rejected(reason));
        }));
        derived
    }

    /// Settle `target` with this promise's eventual outcome.
    ///
    /// Counts as handling a rejection of this promise; `target` is then
    /// responsible for reporting it.
    pub fn forward_to(&self, target: Promise<T, E>) {
        self.observe(Box::new(move |outcome| {
            target.settle(outcome);
        }));
    }

    /// A future that completes once this promise settles.
    ///
    /// Awaiting does not count as handling a rejection.
    pub fn settled(&self) -> Settled<T, E> {
        Settled {
            promise: self.clone(),
        }
    }
}

/// Future returned by [`Promise::settled`]
pub struct Settled<T, E> {
    promise: Promise<T, E>,
}

impl<T: Clone, E: Clone> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.promise.inner.lock();
        if let Some(outcome) = inner.state.outcome() {
            return Poll::Ready(outcome);
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
