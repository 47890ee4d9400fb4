//! # Pledge Core
//!
//! Promise machinery for hosts that can only "run later":
//! - Settle-once [`Promise`] with chained continuations
//! - [`DeferredQueue`] that runs every handler after the settling call returns
//! - Unhandled rejection reporting

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod promise;
pub mod queue;

pub use error::{PromiseError, PromiseResult};
pub use promise::{
    Promise, PromiseState, PromiseWithResolvers, RejectFn, ResolveFn, Settled,
};
pub use queue::{DeferredQueue, DeferredTask, UnhandledRejectionPolicy};
