//! Runtime configuration.
//!
//! Settings can be built in code or read from a `pledge.toml` file:
//!
//! ```toml
//! unhandled_rejection = "panic"
//! max_live_handles = 4096
//! max_drain_tasks = 100000
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RuntimeError, RuntimeResult};
pub use pledge_core::UnhandledRejectionPolicy;

/// Config file names searched by [`find_config_file`]
pub const CONFIG_NAMES: &[&str] = &["pledge.toml", ".pledgerc.toml"];

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// What a drain does with an unhandled rejection.
    /// Default: report it from `run_until_idle`
    pub unhandled_rejection: UnhandledRejectionPolicy,

    /// Maximum number of live (unreleased) handles.
    /// Default: unbounded
    pub max_live_handles: Option<usize>,

    /// Maximum tasks a single drain may run, `0` for no limit.
    /// Default: 0
    pub max_drain_tasks: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unhandled_rejection: UnhandledRejectionPolicy::Report,
            max_live_handles: None,
            max_drain_tasks: 0,
        }
    }
}

impl RuntimeConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unhandled rejection policy.
    pub fn unhandled_rejection(mut self, policy: UnhandledRejectionPolicy) -> Self {
        self.unhandled_rejection = policy;
        self
    }

    /// Bound the number of live handles.
    pub fn max_live_handles(mut self, limit: usize) -> Self {
        self.max_live_handles = Some(limit);
        self
    }

    /// Bound the number of tasks per drain.
    pub fn max_drain_tasks(mut self, limit: usize) -> Self {
        self.max_drain_tasks = limit;
        self
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(source: &str) -> RuntimeResult<Self> {
        toml::from_str(source).map_err(|e| RuntimeError::config("<inline>", e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content).map_err(|e| RuntimeError::config(path, e.to_string()))?;
        tracing::debug!(path = %path.display(), "loaded runtime config");
        Ok(config)
    }

    /// Load the nearest config file above `start`, or defaults if none exists.
    pub fn discover(start: impl AsRef<Path>) -> RuntimeResult<Self> {
        match find_config_file(start.as_ref()) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Search for a configuration file in `start` and its parent directories.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.unhandled_rejection, UnhandledRejectionPolicy::Report);
        assert_eq!(config.max_live_handles, None);
        assert_eq!(config.max_drain_tasks, 0);
    }

    #[test]
    fn test_parse_config() {
        let config = RuntimeConfig::from_toml_str(
            r#"
unhandled_rejection = "panic"
max_live_handles = 16
"#,
        )
        .unwrap();
        assert_eq!(config.unhandled_rejection, UnhandledRejectionPolicy::Panic);
        assert_eq!(config.max_live_handles, Some(16));
        assert_eq!(config.max_drain_tasks, 0);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = RuntimeConfig::from_toml_str("max_handles = 3").unwrap_err();
        assert!(matches!(err, RuntimeError::Config { .. }));
    }

    #[test]
    fn test_builder_setters() {
        let config = RuntimeConfig::new()
            .unhandled_rejection(UnhandledRejectionPolicy::Panic)
            .max_live_handles(2)
            .max_drain_tasks(10);
        assert_eq!(config.unhandled_rejection, UnhandledRejectionPolicy::Panic);
        assert_eq!(config.max_live_handles, Some(2));
        assert_eq!(config.max_drain_tasks, 10);
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pledge.toml"), "max_drain_tasks = 5\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(dir.path().join("pledge.toml"))
        );
        let config = RuntimeConfig::discover(&nested).unwrap();
        assert_eq!(config.max_drain_tasks, 5);
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pledge.toml");
        std::fs::write(&path, "unhandled_rejection = \"ignore\"\n").unwrap();

        let err = RuntimeConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("pledge.toml"));
    }
}
