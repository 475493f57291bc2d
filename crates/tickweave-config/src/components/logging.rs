//! Logging levels for benign task outcomes

use serde::{Deserialize, Serialize};

/// Severity used when a task ends through cancellation.
///
/// Cancellation is never an error, so only the low levels are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationLevel {
    /// `trace!`
    Trace,
    /// `debug!`
    #[default]
    Debug,
    /// `info!`
    Info,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for `TaskCancellation` outcomes.
    #[serde(default)]
    pub cancellation_level: CancellationLevel,
}
