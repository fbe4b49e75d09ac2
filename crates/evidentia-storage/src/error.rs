//! Storage error types.

use evidentia_core::EvidenceError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Namespace or key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing store could not be opened.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other backend failure.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<StorageError> for EvidenceError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
