//! Error types for the sync orchestrator.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::error::BoxError;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while setting up or driving the orchestrator. All of
/// these are startup-fatal; per-file upload failures are handled by
/// the configured [`crate::sync::FailurePolicy`] instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local watch registration failed.
    #[error("failed to set up filesystem watch: {0}")]
    WatchSetup(#[from] notify::Error),

    /// The sidecar state record could not be read or written.
    #[error("failed to access sync state record {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The watch root could not be created or opened.
    #[error("invalid watch root {path}: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
