//! Ledger-related error types.

use evidentia_core::EvidenceError;
use thiserror::Error;

/// Errors from the ledger layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The node could not be reached, or a call failed before any
    /// transaction left this process. Safe to retry.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The node answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// The signed transaction was handed to the node, but the send failed
    /// in a way that does not prove the node dropped it. The transaction
    /// may still be included; treat it as sent and re-query by hash.
    #[error("transaction {tx_hash} may have been sent: {reason}")]
    SendUncertain {
        /// Hash of the signed transaction.
        tx_hash: String,
        /// What the send reported.
        reason: String,
    },

    /// The transaction was included and reverted.
    #[error("transaction {tx_hash} reverted: {reason}")]
    Rejected {
        /// The reverted transaction.
        tx_hash: String,
        /// Revert reason, when known.
        reason: String,
    },

    /// No evidence exists at the requested index or transaction.
    #[error("not found on ledger: {0}")]
    NotFound(String),

    /// A response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Plaintext HTTP to a remote node.
    #[error("insecure RPC URL rejected: {0}")]
    InsecureUrl(String),

    /// Missing or malformed ledger settings.
    #[error("ledger configuration error: {0}")]
    Config(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<LedgerError> for EvidenceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(_) | LedgerError::Rpc { .. } | LedgerError::Decode(_) => {
                Self::LedgerUnavailable(err.to_string())
            },
            LedgerError::SendUncertain { tx_hash, reason } => {
                Self::LedgerSendUncertain { tx_hash, reason }
            },
            LedgerError::Rejected { tx_hash, reason } => Self::LedgerRejected { tx_hash, reason },
            LedgerError::NotFound(what) => Self::NotFound(what),
            LedgerError::InsecureUrl(_) | LedgerError::Config(_) => {
                Self::Configuration(err.to_string())
            },
        }
    }
}
