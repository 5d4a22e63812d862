//! Error types for the storage layer.

use std::path::PathBuf;

use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur against a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store rejected the multipart session initiation.
    #[error("failed to start multipart session for {key}: {source}")]
    SessionInit {
        key: String,
        #[source]
        source: BoxError,
    },

    /// A part failed to upload; no bytes of the write were accepted.
    #[error("failed to upload part {part_number} of {key}: {source}")]
    PartUpload {
        key: String,
        part_number: i32,
        #[source]
        source: BoxError,
    },

    /// The final flush or the completion call failed. The remote
    /// multipart session is left open.
    #[error("failed to finalize {key}: {source}")]
    Finalize {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Stat or get on a key that does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// A remote read or metadata fetch failed for another reason.
    #[error("remote operation on {key} failed: {source}")]
    Remote {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Local file open/read/mkdir failure.
    #[error("local io error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// True when the error means the object simply is not there.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::LocalIo { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
