//! Audit entry types and actions.
//!
//! Every security-relevant operation is recorded as an audit entry. Entries
//! are chain-linked: each stores the previous entry's hash and its own hash
//! over its fields plus that link.

use std::fmt;

use evidentia_core::ActorId;
use evidentia_crypto::ContentHash;
use serde::{Deserialize, Serialize};

/// `prev_hash` of the first entry in a chain.
pub const GENESIS_PREV_HASH: &str = "GENESIS_BLOCK";

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Auto-increment row id, starting at 1.
    pub sequence: u64,
    /// Who performed the action.
    pub actor: ActorId,
    /// What happened, e.g. `anchor_confirmed`.
    pub action: String,
    /// Free-form context for the action.
    pub details: String,
    /// Network address the request came from.
    pub source_address: String,
    /// When the entry was written, as stored (RFC 3339, microseconds).
    pub timestamp: String,
    /// `entry_hash` of the preceding entry, or [`GENESIS_PREV_HASH`].
    pub prev_hash: String,
    /// Hex SHA-256 over `prev_hash` and this entry's fields.
    pub entry_hash: String,
}

impl AuditEntry {
    /// Build an entry linked to `prev_hash`, computing its hash.
    #[must_use]
    pub fn new(
        sequence: u64,
        actor: ActorId,
        action: impl Into<String>,
        details: impl Into<String>,
        source_address: impl Into<String>,
        timestamp: impl Into<String>,
        prev_hash: impl Into<String>,
    ) -> Self {
        let mut entry = Self {
            sequence,
            actor,
            action: action.into(),
            details: details.into(),
            source_address: source_address.into(),
            timestamp: timestamp.into(),
            prev_hash: prev_hash.into(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash(&entry.prev_hash);
        entry
    }

    /// Hash of this entry's stored fields as if linked to `prev_hash`.
    #[must_use]
    pub fn compute_hash(&self, prev_hash: &str) -> String {
        Self::hash_fields(
            prev_hash,
            self.actor,
            &self.action,
            &self.details,
            &self.timestamp,
            &self.source_address,
        )
    }

    /// `SHA-256(prev_hash + actor + action + details + timestamp + source_address)`
    /// as lowercase hex, with no separators.
    #[must_use]
    pub fn hash_fields(
        prev_hash: &str,
        actor: ActorId,
        action: &str,
        details: &str,
        timestamp: &str,
        source_address: &str,
    ) -> String {
        let actor = actor.to_string();
        ContentHash::hash_multi(&[
            prev_hash.as_bytes(),
            actor.as_bytes(),
            action.as_bytes(),
            details.as_bytes(),
            timestamp.as_bytes(),
            source_address.as_bytes(),
        ])
        .to_hex()
    }

    /// Whether this entry correctly follows an entry whose stored hash is
    /// `prev_hash`: the link matches and the stored hash recomputes.
    #[must_use]
    pub fn follows(&self, prev_hash: &str) -> bool {
        self.prev_hash == prev_hash && self.entry_hash == self.compute_hash(prev_hash)
    }
}

/// Actions recorded by the integrity core.
///
/// Stored as their snake-case name. [`AuditAction::Other`] carries actions
/// recorded by surrounding services (logins, exports) verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// A mirror record was created from captured input.
    EvidenceCaptured,
    /// A record's fingerprint was submitted to the ledger.
    AnchorSubmitted,
    /// The ledger confirmed an anchor.
    AnchorConfirmed,
    /// Confirmation did not arrive in time; the submission may still land.
    AnchorPending,
    /// The ledger reverted the submission.
    AnchorRejected,
    /// The ledger could not be reached before submission.
    AnchorFailed,
    /// A second anchor attempt was refused.
    AnchorRefused,
    /// Verification matched the ledger.
    EvidenceVerified,
    /// Verification found a mismatch.
    EvidenceTampered,
    /// Verification had no ledger linkage to check against.
    VerificationSkipped,
    /// Verification could not reach the ledger.
    VerificationFailed,
    /// A record was read.
    EvidenceViewed,
    /// Records were listed.
    EvidenceListed,
    /// An actor asked for a record it does not own.
    AccessDenied,
    /// A login attempt failed.
    LoginFailed,
    /// Any other action, by name.
    Other(String),
}

impl AsRef<str> for AuditAction {
    fn as_ref(&self) -> &str {
        match self {
            Self::EvidenceCaptured => "evidence_captured",
            Self::AnchorSubmitted => "anchor_submitted",
            Self::AnchorConfirmed => "anchor_confirmed",
            Self::AnchorPending => "anchor_pending",
            Self::AnchorRejected => "anchor_rejected",
            Self::AnchorFailed => "anchor_failed",
            Self::AnchorRefused => "anchor_refused",
            Self::EvidenceVerified => "evidence_verified",
            Self::EvidenceTampered => "evidence_tampered",
            Self::VerificationSkipped => "verification_skipped",
            Self::VerificationFailed => "verification_failed",
            Self::EvidenceViewed => "evidence_viewed",
            Self::EvidenceListed => "evidence_listed",
            Self::AccessDenied => "access_denied",
            Self::LoginFailed => "login_failed",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_vector() {
        let ts = "2024-01-01T00:00:00.000000Z";
        let entry = AuditEntry::new(
            1,
            ActorId::SYSTEM,
            AuditAction::LoginFailed.as_ref(),
            "User not found: alice",
            "127.0.0.1",
            ts,
            GENESIS_PREV_HASH,
        );

        let expected = ContentHash::hash(
            format!("GENESIS_BLOCK0login_failedUser not found: alice{ts}127.0.0.1").as_bytes(),
        )
        .to_hex();
        assert_eq!(entry.entry_hash, expected);
        assert!(entry.follows(GENESIS_PREV_HASH));
    }

    #[test]
    fn test_follows_detects_field_edit() {
        let mut entry = AuditEntry::new(
            2,
            ActorId::new(5),
            "anchor_confirmed",
            "record:1",
            "10.0.0.1",
            "2024-01-01T00:00:00.000000Z",
            "abc",
        );
        assert!(entry.follows("abc"));
        assert!(!entry.follows("abd"));

        entry.details = "record:2".into();
        assert!(!entry.follows("abc"));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::EvidenceCaptured.to_string(), "evidence_captured");
        assert_eq!(AuditAction::Other("export_pdf".into()).as_ref(), "export_pdf");
    }

    #[test]
    fn test_entry_serde() {
        let entry = AuditEntry::new(1, ActorId::new(3), "a", "d", "s", "t", GENESIS_PREV_HASH);
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
