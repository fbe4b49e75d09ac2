//! Audit-related error types.

use evidentia_core::EvidenceError;
use evidentia_storage::StorageError;
use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage error.
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    /// The chain is broken at the given zero-based position.
    #[error("audit chain broken at index {index}")]
    ChainBroken {
        /// First entry whose link or hash does not check out.
        index: u64,
    },
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

impl From<AuditError> for EvidenceError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::StorageError(e) => e.into(),
            AuditError::ChainBroken { index } => Self::ChainBreak { index },
        }
    }
}
