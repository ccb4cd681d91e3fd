//! Error types for configuration loading and validation

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Secret not found
    #[error("secret '{key}' not found in secrets.yaml")]
    SecretNotFound { key: String },

    /// Circular include detected
    #[error("circular include detected: {path}")]
    CircularInclude { path: PathBuf },

    /// Environment variable not set and no default given
    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// A tag was applied to something other than a string
    #[error("invalid value for '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// The `smartify:` section is missing
    #[error("no 'smartify' section in configuration")]
    MissingSection,

    /// Unknown controller type
    #[error("invalid controller type: {0}")]
    InvalidControllerType(String),

    /// A controller lacks an option its type requires
    #[error("{controller_type} controller requires option '{option}'")]
    MissingOption {
        controller_type: String,
        option: &'static str,
    },

    /// A numeric option is outside the accepted range
    #[error("option '{option}' is out of range: {reason}")]
    OutOfRange { option: &'static str, reason: String },

    /// A controller option has the wrong shape
    #[error("invalid controller configuration: {0}")]
    InvalidController(#[source] serde_yaml::Error),
}
