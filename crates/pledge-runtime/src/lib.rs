//! # Pledge Runtime
//!
//! Handle-based promise runtime for embeddings that cannot hold object
//! references, providing:
//! - Integer handles for promises, with explicit release
//! - Manual completion of promises from outside their executor
//! - Signal locks with thread blocking or promise-based waiting
//! - TOML configuration and a builder API

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod error;
pub mod lock;
pub mod manual;
pub mod registry;
pub mod runtime;
pub mod value;

pub use builder::RuntimeBuilder;
pub use config::{RuntimeConfig, UnhandledRejectionPolicy};
pub use error::{PromiseError, RuntimeError, RuntimeResult};
pub use lock::{LockKey, LockTable};
pub use manual::{CompleteOperation, ManualCompletion, ManualTable};
pub use registry::{Handle, HandleRegistry};
pub use runtime::Runtime;
pub use value::{DynPromise, DynReject, DynResolve, Value};

// Re-export the core types the runtime API exposes
pub use pledge_core::{DeferredQueue, Promise, PromiseState};
