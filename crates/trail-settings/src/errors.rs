//! Errors raised while loading `~/.trail/settings.json`.

use std::path::PathBuf;

use thiserror::Error;

/// The settings file could not be turned into [`TrailSettings`](crate::TrailSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },

    /// The merged document does not fit the settings schema
    /// (for example an unknown `creationPolicy`).
    #[error("invalid settings: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
