//! # Tickweave Configuration
//!
//! Type-safe configuration for tickweave task sessions. Every field has a
//! default, so an empty document is a valid configuration.
//!
//! ```rust
//! use tickweave_config::{SchedulerConfig, ShutdownStrategy};
//!
//! let config = SchedulerConfig::from_toml_str(
//!     r#"
//! shutdown_strategy = "manual"
//!
//! [timing]
//! tick_millis = 25
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.shutdown_strategy, ShutdownStrategy::Manual);
//! assert_eq!(config.timing.tick_millis, 25);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
mod error;

pub use components::{CancellationLevel, LoggingConfig, TimingConfig, WakeupConfig};
pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Controls when an owner's session is torn down.
///
/// Only the trigger differs between strategies; the disposal itself is identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStrategy {
    /// Dispose automatically when the host disables the owner and tears down its scheduler.
    #[default]
    Scheduler,
    /// The owner disposes its session explicitly.
    Manual,
}

impl ShutdownStrategy {
    /// Lowercase name as it appears in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ShutdownStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration shared by every session created from one registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default shutdown strategy for new sessions.
    #[serde(default)]
    pub shutdown_strategy: ShutdownStrategy,

    /// Host tick timing.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Startup wakeup bridge tuning.
    #[serde(default)]
    pub wakeup: WakeupConfig,

    /// Log levels for benign outcomes.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded scheduler config");
        Ok(config)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would stall the scheduler.
    pub fn validate(&self) -> ConfigResult<()> {
        self.timing.validate()?;
        self.wakeup.validate()?;
        Ok(())
    }
}
