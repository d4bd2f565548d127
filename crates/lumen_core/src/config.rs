//! # Configuration
//!
//! Engine and manager settings, loaded once at startup from TOML.
//!
//! ```toml
//! log_filter = "info,lumen_rendering=debug"
//!
//! [[managers]]
//! name = "main"
//! parallelism = 4
//! expected_operations = 256
//! target_fps = 60
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ensure_positive, CoreError, CoreResult};

/// Settings for one render-owning manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name used for the render thread and in logs.
    pub name: String,
    /// Worker threads used to run one update batch.
    pub parallelism: usize,
    /// Expected number of registered operations (pre-sizes the registry).
    pub expected_operations: usize,
    /// Frame pacing target. Zero disables pacing.
    pub target_fps: u32,
    /// Initial draw queue capacity.
    pub queue_capacity: usize,
    /// Input snapshots kept warm in the pool.
    pub snapshot_pool_size: usize,
}

impl ManagerConfig {
    /// Creates a validated manager configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `parallelism` or
    /// `expected_operations` is zero.
    pub fn new(
        name: impl Into<String>,
        parallelism: usize,
        expected_operations: usize,
    ) -> CoreResult<Self> {
        let config = Self {
            name: name.into(),
            parallelism,
            expected_operations,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the range of every construction parameter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for the first zero parameter.
    pub fn validate(&self) -> CoreResult<()> {
        ensure_positive("parallelism", self.parallelism)?;
        ensure_positive("expected_operations", self.expected_operations)?;
        ensure_positive("queue_capacity", self.queue_capacity)?;
        Ok(())
    }

    /// Returns a copy with a different frame pacing target.
    #[must_use]
    pub fn with_target_fps(mut self, target_fps: u32) -> Self {
        self.target_fps = target_fps;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "main".to_owned(),
            parallelism: 1,
            expected_operations: 64,
            target_fps: 60,
            queue_capacity: 256,
            snapshot_pool_size: 2,
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// One entry per render-owning manager.
    pub managers: Vec<ManagerConfig>,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the document does not parse and
    /// [`CoreError::InvalidArgument`] if a manager fails validation.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Validates every manager entry.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> CoreResult<()> {
        if self.managers.is_empty() {
            return Err(CoreError::InvalidConfig("at least one manager is required".to_owned()));
        }
        for manager in &self.managers {
            manager.validate()?;
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_owned(),
            managers: vec![ManagerConfig::default()],
        }
    }
}
