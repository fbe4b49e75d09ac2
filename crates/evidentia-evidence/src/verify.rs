//! Reconciliation of a mirror row against the ledger's copy.

use std::fmt;

use evidentia_core::{LedgerPointer, RecordId, VerifiedFlag};
use evidentia_crypto::ContentHash;
use evidentia_ledger::AnchoredRecord;
use serde::Serialize;

/// Outcome of one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// The ledger copy hashes to its stored hash, which is the hash this
    /// record anchored.
    Verified,
    /// Something does not match.
    Tampered,
    /// The record has no ledger linkage yet.
    Skipped,
}

impl VerificationStatus {
    /// The flag stored on the mirror row.
    #[must_use]
    pub fn flag(self) -> VerifiedFlag {
        match self {
            Self::Verified => VerifiedFlag::Verified,
            Self::Tampered => VerifiedFlag::Tampered,
            Self::Skipped => VerifiedFlag::Unset,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::Tampered => write!(f, "tampered"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What was compared, and the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// The mirror row.
    pub record_id: RecordId,
    /// Verdict.
    pub status: VerificationStatus,
    /// Hash recomputed from the fields the ledger returned. `None` when
    /// skipped, or when the ledger returned an empty hashed field.
    pub calculated_hash: Option<String>,
    /// Hash stored on the ledger.
    pub on_chain_hash: Option<String>,
    /// Hash this record anchored, from the mirror.
    pub anchored_hash: Option<String>,
    /// Where the ledger copy was read.
    pub ledger: Option<LedgerPointer>,
}

/// Compares ledger copies against what a record anchored.
///
/// Pure: fetching and persisting the flag are the store's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationVerifier;

impl ReconciliationVerifier {
    /// Report for a record with no ledger linkage.
    #[must_use]
    pub fn skipped(record_id: RecordId) -> VerificationReport {
        VerificationReport {
            record_id,
            status: VerificationStatus::Skipped,
            calculated_hash: None,
            on_chain_hash: None,
            anchored_hash: None,
            ledger: None,
        }
    }

    /// Recompute the canonical hash of `on_chain` and decide.
    ///
    /// The record is verified only if the recomputed hash equals the hash
    /// the ledger stored and, when the mirror knows what it anchored, that
    /// stored hash is the anchored one. The second check catches a ledger
    /// slot that now holds a different, self-consistent record.
    #[must_use]
    pub fn reconcile(
        record_id: RecordId,
        pointer: &LedgerPointer,
        on_chain: &AnchoredRecord,
        anchored_hash: Option<&str>,
    ) -> VerificationReport {
        let calculated = on_chain.record.recompute_hash().ok();
        let stored = ContentHash::from_hex(&on_chain.record.content_hash).ok();
        let anchored = anchored_hash.and_then(|h| ContentHash::from_hex(h).ok());

        let self_consistent =
            matches!((&calculated, &stored), (Some(c), Some(s)) if c.ct_matches(s));
        let matches_anchor = match (anchored_hash, &anchored, &stored) {
            (None, _, _) => true,
            (Some(_), Some(a), Some(s)) => a.ct_matches(s),
            (Some(_), _, _) => false,
        };

        let status = if self_consistent && matches_anchor {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Tampered
        };

        VerificationReport {
            record_id,
            status,
            calculated_hash: calculated.map(|h| h.to_hex()),
            on_chain_hash: Some(on_chain.record.content_hash.clone()),
            anchored_hash: anchored_hash.map(str::to_string),
            ledger: Some(pointer.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::ConfidenceScaled;
    use evidentia_crypto::CanonicalHasher;
    use evidentia_ledger::LedgerRecord;

    fn on_chain(content: &str, stored_hash: &str) -> AnchoredRecord {
        AnchoredRecord {
            index: 0,
            tx_hash: None,
            record: LedgerRecord {
                content_hash: stored_hash.to_string(),
                post_id: "100".into(),
                timestamp: "2024-01-01T00:00:00".into(),
                investigator: "1".into(),
                content: content.into(),
                author_handle: "user1".into(),
                media_urls: vec![],
                classification: "unclassified".into(),
                confidence: ConfidenceScaled::from_raw(0),
                engagement_metrics: "{}".into(),
            },
        }
    }

    fn hash_of(content: &str) -> String {
        CanonicalHasher::hash(content, "user1", "100", "2024-01-01T00:00:00")
            .unwrap()
            .to_hex()
    }

    fn pointer() -> LedgerPointer {
        LedgerPointer {
            index: 0,
            tx_hash: "0xab".into(),
        }
    }

    #[test]
    fn test_untouched_record_verifies() {
        let hash = hash_of("Suspect claims X");
        let report = ReconciliationVerifier::reconcile(
            RecordId(1),
            &pointer(),
            &on_chain("Suspect claims X", &hash),
            Some(&hash),
        );
        assert_eq!(report.status, VerificationStatus::Verified);
        assert_eq!(report.calculated_hash, report.on_chain_hash);
        assert_eq!(report.status.flag(), VerifiedFlag::Verified);
    }

    #[test]
    fn test_edited_content_is_tampered() {
        let hash = hash_of("Suspect claims X");
        let report = ReconciliationVerifier::reconcile(
            RecordId(1),
            &pointer(),
            &on_chain("Suspect claims Y", &hash),
            Some(&hash),
        );
        assert_eq!(report.status, VerificationStatus::Tampered);
        assert_ne!(report.calculated_hash, report.on_chain_hash);
    }

    #[test]
    fn test_substituted_consistent_record_is_tampered() {
        let ours = hash_of("Suspect claims X");
        let theirs = hash_of("Something else");
        let report = ReconciliationVerifier::reconcile(
            RecordId(1),
            &pointer(),
            &on_chain("Something else", &theirs),
            Some(&ours),
        );
        assert_eq!(report.calculated_hash, report.on_chain_hash);
        assert_eq!(report.status, VerificationStatus::Tampered);
    }

    #[test]
    fn test_hash_case_is_ignored() {
        let hash = hash_of("Suspect claims X");
        let report = ReconciliationVerifier::reconcile(
            RecordId(1),
            &pointer(),
            &on_chain("Suspect claims X", &hash.to_uppercase()),
            Some(&hash),
        );
        assert_eq!(report.status, VerificationStatus::Verified);
    }

    #[test]
    fn test_empty_ledger_field_is_tampered_not_error() {
        let hash = hash_of("Suspect claims X");
        let report =
            ReconciliationVerifier::reconcile(RecordId(1), &pointer(), &on_chain("", &hash), None);
        assert_eq!(report.status, VerificationStatus::Tampered);
        assert_eq!(report.calculated_hash, None);
    }

    #[test]
    fn test_skipped_leaves_flag_unset() {
        let report = ReconciliationVerifier::skipped(RecordId(4));
        assert_eq!(report.status.flag(), VerifiedFlag::Unset);
        assert_eq!(report.on_chain_hash, None);
    }
}
