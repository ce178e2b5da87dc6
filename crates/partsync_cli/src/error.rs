//! CLI error type.

use partsync_engine::SyncError;
use partsync_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// The config file exists but could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    ConfigRead {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`CliConfig`](crate::config::CliConfig).
    #[error("failed to parse config file '{}': {source}", path.display())]
    ConfigParse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A setting is missing or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A sync or push pass reported failure.
    #[error("sync failed: {0}")]
    SyncFailed(String),

    /// Engine setup error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Local store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Output encoding error.
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    /// I/O error (runtime setup, stdout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
