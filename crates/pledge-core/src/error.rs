//! Promise error types

use thiserror::Error;

/// Errors surfaced while draining the deferred queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// A promise was rejected and nothing was attached to observe the reason
    /// when its notification ran.
    #[error("Unhandled promise rejection: {reason}")]
    UnhandledRejection {
        /// Display rendering of the rejection reason
        reason: String,
    },

    /// A single drain ran more tasks than the configured budget allows
    #[error("Deferred queue exceeded {limit} tasks in a single drain")]
    DrainLimitExceeded {
        /// The configured budget
        limit: usize,
    },
}

impl PromiseError {
    /// Create an unhandled rejection error from a displayable reason
    pub fn unhandled(reason: &impl std::fmt::Display) -> Self {
        Self::UnhandledRejection {
            reason: reason.to_string(),
        }
    }

    /// Whether this error is an unhandled rejection
    pub fn is_unhandled_rejection(&self) -> bool {
        matches!(self, Self::UnhandledRejection { .. })
    }
}

/// Result type for promise operations
pub type PromiseResult<T> = std::result::Result<T, PromiseError>;
