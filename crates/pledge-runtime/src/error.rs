//! Error types for pledge-runtime

use std::path::PathBuf;
use thiserror::Error;

use crate::lock::LockKey;
use crate::registry::Handle;

// Re-export core error types
pub use pledge_core::{PromiseError, PromiseResult};

/// Errors that can occur during runtime operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Handle was never issued by this runtime
    #[error("Handle {0} is out of range: it was never issued")]
    UnknownHandle(Handle),

    /// Handle was issued and later released
    #[error("Handle {0} has been released")]
    ReleasedHandle(Handle),

    /// Handle has no manual completion entry
    #[error("Handle {0} was not created by wrapper()")]
    NotManual(Handle),

    /// Lock key was never issued or has been destroyed
    #[error("Unknown lock {0}")]
    UnknownLock(LockKey),

    /// Live handle limit reached
    #[error("Handle registry is full ({0} live handles)")]
    RegistryFull(usize),

    /// Error raised while draining the deferred queue
    #[error(transparent)]
    Promise(#[from] PromiseError),

    /// Configuration could not be parsed
    #[error("Failed to parse {}: {message}", .path.display())]
    Config {
        /// Source of the configuration
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Create a configuration error
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports an unhandled promise rejection
    pub fn is_unhandled_rejection(&self) -> bool {
        matches!(self, Self::Promise(err) if err.is_unhandled_rejection())
    }
}

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
