//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Requested range not satisfiable (object is {len} bytes)")]
    RangeNotSatisfiable { len: u64 },

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn commit_failed(msg: impl Into<String>) -> Self {
        Self::CommitFailed(msg.into())
    }
}
