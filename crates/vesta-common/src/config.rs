//! Configuration model for the lifecycle core.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, VestaError};

/// Tunables for container lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Default per-signal wait used by `shutdown` when the caller gives none.
    pub stop_timeout_secs: u64,
    /// Bound on waiting for the guest's launch status after power-on.
    pub launch_status_timeout_secs: u64,
    /// Guest program used to deliver signals.
    pub signal_program: String,
    /// Metadata key prefix for the executor configuration.
    pub metadata_prefix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
            launch_status_timeout_secs: constants::DEFAULT_LAUNCH_STATUS_TIMEOUT_SECS,
            signal_program: constants::DEFAULT_SIGNAL_PROGRAM.to_string(),
            metadata_prefix: constants::DEFAULT_METADATA_PREFIX.to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading lifecycle config");
        let content = std::fs::read_to_string(path).map_err(|e| VestaError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every timeout is non-zero and every name is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`VestaError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("stop_timeout_secs", self.stop_timeout_secs),
            ("launch_status_timeout_secs", self.launch_status_timeout_secs),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(VestaError::Config {
                message: format!("{field} must be greater than zero"),
            });
        }
        if self.signal_program.trim().is_empty() {
            return Err(VestaError::Config {
                message: "signal_program must not be empty".into(),
            });
        }
        if self.metadata_prefix.trim().is_empty() {
            return Err(VestaError::Config {
                message: "metadata_prefix must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Default per-signal shutdown wait.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Bound on the launch-status wait in `start`.
    #[must_use]
    pub const fn launch_status_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_status_timeout_secs)
    }
}
