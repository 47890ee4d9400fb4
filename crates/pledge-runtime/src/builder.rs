//! RuntimeBuilder - fluent construction of a [`Runtime`]
//!
//! ```ignore
//! use pledge_runtime::{RuntimeBuilder, UnhandledRejectionPolicy};
//!
//! let runtime = RuntimeBuilder::new()
//!     .unhandled_rejection(UnhandledRejectionPolicy::Panic)
//!     .max_live_handles(1024)
//!     .build();
//! ```

use pledge_core::{DeferredQueue, UnhandledRejectionPolicy};
use std::path::Path;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;
use crate::runtime::Runtime;

/// Builder for [`Runtime`]
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file
    pub fn config_file(mut self, path: impl AsRef<Path>) -> RuntimeResult<Self> {
        self.config = RuntimeConfig::load(path)?;
        Ok(self)
    }

    /// Set the unhandled rejection policy
    pub fn unhandled_rejection(mut self, policy: UnhandledRejectionPolicy) -> Self {
        self.config.unhandled_rejection = policy;
        self
    }

    /// Bound the number of live handles
    pub fn max_live_handles(mut self, limit: usize) -> Self {
        self.config.max_live_handles = Some(limit);
        self
    }

    /// Bound the number of tasks per drain, `0` for no limit
    pub fn max_drain_tasks(mut self, limit: usize) -> Self {
        self.config.max_drain_tasks = limit;
        self
    }

    /// Build the runtime
    pub fn build(self) -> Runtime {
        let queue = DeferredQueue::new()
            .with_policy(self.config.unhandled_rejection)
            .with_max_tasks(self.config.max_drain_tasks);
        Runtime::from_parts(self.config, Arc::new(queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_applies_config() {
        let runtime = RuntimeBuilder::new()
            .unhandled_rejection(UnhandledRejectionPolicy::Panic)
            .max_drain_tasks(3)
            .max_live_handles(8)
            .build();

        assert_eq!(
            runtime.queue().policy(),
            UnhandledRejectionPolicy::Panic
        );
        assert_eq!(runtime.config().max_drain_tasks, 3);
        assert_eq!(runtime.config().max_live_handles, Some(8));
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pledge.toml");
        std::fs::write(&path, "max_live_handles = 1\n").unwrap();

        let runtime = RuntimeBuilder::new().config_file(&path).unwrap().build();
        runtime.create(|_, _| Ok(())).unwrap();
        assert!(runtime.create(|_, _| Ok(())).is_err());
    }
}
