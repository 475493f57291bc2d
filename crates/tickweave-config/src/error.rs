use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization back to TOML failed.
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
