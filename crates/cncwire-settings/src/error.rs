//! Settings errors.

use std::io;
use thiserror::Error;

/// Failures while loading, saving, or validating a [`crate::Config`]
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A value failed validation
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// Dotted path, e.g. `connection.baud_rate`
        key: String,
        /// Constraint that was violated
        reason: String,
    },

    /// File extension is neither `.json` nor `.toml`
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// No platform config directory
    #[error("Cannot locate config directory: {0}")]
    ConfigDirectory(String),

    /// Reading or writing the file failed
    #[error("Config file I/O failed: {0}")]
    IoError(#[from] io::Error),

    /// Malformed JSON
    #[error("Invalid JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Malformed TOML
    #[error("Invalid TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Config could not be rendered as TOML
    #[error("Cannot write TOML config: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl SettingsError {
    /// [`SettingsError::InvalidSetting`] for `key`
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias over [`SettingsError`]
pub type SettingsResult<T> = Result<T, SettingsError>;
