//! Error taxonomy for the evidence integrity core.
//!
//! Integrity mismatches are deliberately absent: a recomputed hash that
//! differs from the ledger's is a verification *outcome*, reported as a
//! status, never as an error.

use thiserror::Error;

/// Errors surfaced by evidence integrity operations.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Missing or malformed input (hashing fields, boundary payloads).
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing key material or ledger credentials on a path that cannot degrade.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The ledger could not be reached, or estimation/submission failed
    /// before a transaction was sent. Safe to retry.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// A signed transaction may have reached the ledger even though the
    /// send failed. Resubmitting could create a second entry; re-query by
    /// hash instead.
    #[error("ledger transaction {tx_hash} may have been sent: {reason}")]
    LedgerSendUncertain {
        /// Hash of the signed transaction.
        tx_hash: String,
        /// What the send reported.
        reason: String,
    },

    /// The submission was included but reverted. Retrying the same payload
    /// will not help.
    #[error("ledger rejected transaction {tx_hash}: {reason}")]
    LedgerRejected {
        /// The reverted transaction.
        tx_hash: String,
        /// Why the ledger rejected it, when known.
        reason: String,
    },

    /// The requesting actor does not own the record.
    #[error("actor {actor} is not authorized for record {record}")]
    Authorization {
        /// The actor that made the request.
        actor: String,
        /// The record that was requested.
        record: String,
    },

    /// An explicit audit scan found a discontinuity.
    #[error("audit chain broken at index {index}")]
    ChainBreak {
        /// Zero-based position of the first broken entry.
        index: u64,
    },

    /// The record already carries ledger pointers.
    #[error("record {record} is already anchored at ledger index {index}")]
    AlreadyAnchored {
        /// The mirror record.
        record: String,
        /// The ledger index it is anchored at.
        index: u64,
    },

    /// A submission for this record is awaiting inclusion; resume it
    /// instead of submitting again.
    #[error("record {record} has a pending submission {tx_hash}")]
    AnchorPending {
        /// The mirror record.
        record: String,
        /// The outstanding transaction hash.
        tx_hash: String,
    },

    /// Another caller has claimed this record and is submitting it now.
    #[error("record {record} is being submitted by another caller")]
    AnchorInFlight {
        /// The mirror record.
        record: String,
    },

    /// A requested record or ledger entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The local store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl EvidenceError {
    /// Whether the failed operation can be retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_) | Self::Storage(_))
    }
}

/// Result type for evidence integrity operations.
pub type EvidenceResult<T> = Result<T, EvidenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EvidenceError::LedgerUnavailable("down".into()).is_retryable());
        assert!(
            !EvidenceError::LedgerRejected {
                tx_hash: "0xab".into(),
                reason: "revert".into(),
            }
            .is_retryable()
        );
        assert!(
            !EvidenceError::Authorization {
                actor: "1".into(),
                record: "2".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_mentions_tx_hash() {
        let err = EvidenceError::AnchorPending {
            record: "record:7".into(),
            tx_hash: "0xfeed".into(),
        };
        assert!(err.to_string().contains("0xfeed"));
    }
}
