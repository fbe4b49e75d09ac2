//! The evidence store: capture, anchor, verify, retrieve.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use evidentia_audit::{AuditAction, AuditChain};
use evidentia_core::{
    ActorId, ArtifactFetcher, Classification, Classifier, EvidenceError, EvidenceInput,
    EvidenceResult, LedgerPointer, RecordId, Timestamp,
};
use evidentia_crypto::{CanonicalHasher, FieldCipher};
use evidentia_ledger::{Confirmation, LedgerAnchor, LedgerError, LedgerRecord, SubmissionHandle};
use evidentia_storage::KvStore;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::mirror::{AnchorClaim, EvidenceView, LocalMirrorRecord, MirrorStore, PendingAnchor};
use crate::verify::{ReconciliationVerifier, VerificationReport, VerificationStatus};

/// How an `anchor` or `resume_anchor` call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnchorOutcome {
    /// Confirmed; pointers stored on the row.
    Anchored {
        /// Ledger location.
        pointer: LedgerPointer,
        /// Canonical hash that was anchored.
        content_hash: String,
    },
    /// Sent but not confirmed in time. Resume later; do not resubmit.
    Pending {
        /// Transaction to re-query.
        tx_hash: String,
    },
    /// Reverted. The row is free to be anchored again, but the same
    /// payload is likely to revert again.
    Rejected {
        /// The reverted transaction.
        tx_hash: String,
        /// Revert reason.
        reason: String,
    },
    /// Nothing was sent and the row's claim was released. Safe to retry.
    Unavailable {
        /// What failed.
        reason: String,
    },
}

impl AnchorOutcome {
    /// Whether calling `anchor` again is the right next step.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for AnchorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anchored { pointer, .. } => write!(f, "anchored at {pointer}"),
            Self::Pending { tx_hash } => write!(f, "pending ({tx_hash})"),
            Self::Rejected { tx_hash, reason } => write!(f, "rejected ({tx_hash}): {reason}"),
            Self::Unavailable { reason } => write!(f, "ledger unavailable: {reason}"),
        }
    }
}

type RowLocks = DashMap<RecordId, Arc<Mutex<()>>>;

/// In-process hold on one record. Dropping it removes the record's lock
/// from the map once nobody else is waiting on it.
struct RowGuard<'a> {
    locks: &'a RowLocks,
    id: RecordId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Orchestrates mirror rows, the cipher, the ledger and the audit chain.
///
/// A record is submitted only by the caller that claimed it in storage
/// (see [`MirrorStore::update`]), so two anchors of one record never both
/// submit, even from different processes. Within a process, operations
/// on one record also queue on a per-record lock so they do not race to
/// the ledger just to lose the claim.
pub struct EvidenceStore {
    mirror: MirrorStore,
    cipher: Arc<dyn FieldCipher>,
    audit: Arc<AuditChain>,
    ledger: Option<Arc<dyn LedgerAnchor>>,
    row_locks: RowLocks,
}

impl EvidenceStore {
    /// Create a store without a ledger. Capture and retrieval work;
    /// anchoring and verification fail with a configuration error until
    /// [`with_ledger`](Self::with_ledger) is used.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, cipher: Arc<dyn FieldCipher>, audit: Arc<AuditChain>) -> Self {
        Self {
            mirror: MirrorStore::new(store),
            cipher,
            audit,
            ledger: None,
            row_locks: DashMap::new(),
        }
    }

    /// Attach the ledger used for anchoring and verification.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerAnchor>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// The audit chain this store writes to.
    #[must_use]
    pub fn audit(&self) -> &AuditChain {
        &self.audit
    }

    /// The attached ledger, if any.
    #[must_use]
    pub fn ledger(&self) -> Option<&Arc<dyn LedgerAnchor>> {
        self.ledger.as_ref()
    }

    fn require_ledger(&self) -> EvidenceResult<Arc<dyn LedgerAnchor>> {
        self.ledger.clone().ok_or_else(|| {
            EvidenceError::Configuration("no ledger configured for anchoring".into())
        })
    }

    async fn lock_row(&self, id: RecordId) -> RowGuard<'_> {
        let lock = Arc::clone(
            self.row_locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        RowGuard {
            locks: &self.row_locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Audit failures are logged and never undo the operation they describe.
    async fn note(&self, actor: ActorId, action: AuditAction, details: &str) {
        if let Err(e) = self.audit.append(actor, action, details).await {
            error!(actor = %actor, details, error = %e, "Failed to append audit entry");
        }
    }

    async fn owned_row(
        &self,
        id: RecordId,
        actor: ActorId,
        operation: &str,
    ) -> EvidenceResult<LocalMirrorRecord> {
        let row = self.mirror.require(id).await?;
        if !row.is_owned_by(actor) {
            warn!(actor = %actor, record_id = %id, operation, "Access denied");
            self.note(actor, AuditAction::AccessDenied, &format!("{operation} {id}"))
                .await;
            return Err(EvidenceError::Authorization {
                actor: actor.to_string(),
                record: id.to_string(),
            });
        }
        Ok(row)
    }

    /// Validate `input`, encrypt its displayable fields and persist a new
    /// mirror row owned by `actor`. No hash is computed here.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] for malformed input or
    /// classification, or a storage/crypto error.
    pub async fn create(
        &self,
        input: EvidenceInput,
        actor: ActorId,
        classification: Option<Classification>,
    ) -> EvidenceResult<RecordId> {
        let artifact = input.validate()?;
        if let Some(c) = &classification {
            c.validate()?;
        }

        let id = self.mirror.allocate_id().await?;
        let row = LocalMirrorRecord::seal(id, actor, &artifact, classification, self.cipher.as_ref())?;
        self.mirror.put(&row).await?;

        let text_check = match row.submitted_text_matches {
            Some(true) => " submitted_text=match",
            Some(false) => " submitted_text=mismatch",
            None => "",
        };
        info!(record_id = %id, post_id = %row.post_id, actor = %actor, "Captured evidence");
        self.note(
            actor,
            AuditAction::EvidenceCaptured,
            &format!("{id} post:{}{text_check}", row.post_id),
        )
        .await;
        Ok(id)
    }

    /// Fetch an artifact through the collaborator, classify it if a
    /// classifier is given, and [`create`](Self::create) a row.
    ///
    /// A failing classifier does not block capture.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error, or any error from `create`.
    pub async fn capture(
        &self,
        fetcher: &dyn ArtifactFetcher,
        classifier: Option<&dyn Classifier>,
        locator: &str,
        submitted_text: Option<String>,
        actor: ActorId,
    ) -> EvidenceResult<RecordId> {
        let fetched = fetcher.fetch(locator).await?;

        let classification = match classifier {
            Some(classifier) => match classifier.classify(&fetched.content).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(locator, error = %e, "Classification failed; capturing unclassified");
                    None
                },
            },
            None => None,
        };

        self.create(fetched.into_input(submitted_text), actor, classification)
            .await
    }

    /// Compute the canonical hash and anchor it on the ledger, once.
    ///
    /// The row is claimed in storage before anything is sent. Ledger
    /// connectivity failures release the claim and come back as
    /// [`AnchorOutcome::Unavailable`], not as `Err`.
    ///
    /// # Errors
    ///
    /// - [`EvidenceError::AlreadyAnchored`] if the row has pointers
    /// - [`EvidenceError::AnchorPending`] if a submission is outstanding
    /// - [`EvidenceError::AnchorInFlight`] if another caller holds the claim
    /// - [`EvidenceError::Authorization`] if `actor` does not own the row
    /// - [`EvidenceError::Configuration`] without a usable ledger
    pub async fn anchor(&self, id: RecordId, actor: ActorId) -> EvidenceResult<AnchorOutcome> {
        let ledger = self.require_ledger()?;
        let _row = self.lock_row(id).await;

        let row = self.owned_row(id, actor, "anchor").await?;
        if let Err(e) = row.ensure_unanchored() {
            self.note(actor, AuditAction::AnchorRefused, &format!("{id} {e}"))
                .await;
            return Err(e);
        }

        let artifact = row.unseal(self.cipher.as_ref())?;
        let content_hash = CanonicalHasher::hash_artifact(&artifact)?;
        let classification = match &row.classification {
            Some(c) => Some((c, c.scaled_confidence()?)),
            None => None,
        };
        let record = LedgerRecord::new(&artifact, &content_hash, row.investigator, classification);

        let claim = AnchorClaim {
            content_hash: content_hash.to_hex(),
            claimed_at: Timestamp::now().to_audit_string(),
        };
        let claimed = self
            .mirror
            .update(id, |row| {
                row.ensure_unanchored()?;
                row.claim = Some(claim.clone());
                Ok(())
            })
            .await;
        if let Err(e) = claimed {
            if matches!(
                e,
                EvidenceError::AlreadyAnchored { .. }
                    | EvidenceError::AnchorPending { .. }
                    | EvidenceError::AnchorInFlight { .. }
            ) {
                self.note(actor, AuditAction::AnchorRefused, &format!("{id} {e}"))
                    .await;
            }
            return Err(e);
        }

        let submitted = evidentia_ledger::submit_once(ledger.as_ref(), &record).await;
        let (handle, send_note) = match submitted {
            Ok(handle) => (handle, String::new()),
            Err(LedgerError::SendUncertain { tx_hash, reason }) => {
                warn!(
                    record_id = %id,
                    tx_hash = %tx_hash,
                    reason = %reason,
                    "Send outcome unknown; treating as sent"
                );
                (SubmissionHandle { tx_hash }, format!(" send_uncertain: {reason}"))
            },
            Err(e) => {
                let err = EvidenceError::from(e);
                self.release_claim(id).await?;
                self.note(actor, AuditAction::AnchorFailed, &format!("{id} {err}"))
                    .await;
                if !err.is_retryable() {
                    return Err(err);
                }
                warn!(record_id = %id, error = %err, "Anchor submission failed; nothing sent");
                return Ok(AnchorOutcome::Unavailable {
                    reason: err.to_string(),
                });
            },
        };

        let pending = PendingAnchor {
            tx_hash: handle.tx_hash.clone(),
            content_hash: claim.content_hash.clone(),
            submitted_at: Timestamp::now().to_audit_string(),
        };
        let recorded = self
            .mirror
            .update(id, |row| {
                row.claim = None;
                row.pending = Some(pending.clone());
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            // The claim stays, which keeps the row from being resubmitted.
            error!(
                record_id = %id,
                tx_hash = %handle,
                error = %e,
                "Submitted to ledger but could not record the pending handle"
            );
            return Err(e);
        }
        self.note(
            actor,
            AuditAction::AnchorSubmitted,
            &format!("{id} tx:{} hash:{}{send_note}", handle.tx_hash, claim.content_hash),
        )
        .await;

        self.settle(ledger.as_ref(), id, &pending, actor).await
    }

    /// Drop this caller's claim after a submission that provably sent
    /// nothing.
    async fn release_claim(&self, id: RecordId) -> EvidenceResult<()> {
        self.mirror
            .update(id, |row| {
                row.claim = None;
                Ok(())
            })
            .await
            .inspect_err(|e| {
                error!(record_id = %id, error = %e, "Could not release anchor claim");
            })?;
        Ok(())
    }

    /// Re-query the ledger for a submission that timed out earlier and
    /// finish anchoring if it landed.
    ///
    /// # Errors
    ///
    /// - [`EvidenceError::AlreadyAnchored`] if the row has pointers
    /// - [`EvidenceError::AnchorInFlight`] if a submission is still being sent
    /// - [`EvidenceError::Validation`] if nothing is pending
    /// - [`EvidenceError::Authorization`] if `actor` does not own the row
    pub async fn resume_anchor(
        &self,
        id: RecordId,
        actor: ActorId,
    ) -> EvidenceResult<AnchorOutcome> {
        let ledger = self.require_ledger()?;
        let _row = self.lock_row(id).await;

        let row = self.owned_row(id, actor, "resume").await?;
        if let Some(pointer) = &row.ledger {
            return Err(EvidenceError::AlreadyAnchored {
                record: id.to_string(),
                index: pointer.index,
            });
        }
        let Some(pending) = row.pending else {
            if row.claim.is_some() {
                return Err(EvidenceError::AnchorInFlight {
                    record: id.to_string(),
                });
            }
            return Err(EvidenceError::Validation(format!(
                "{id} has no pending ledger submission"
            )));
        };

        info!(record_id = %id, tx_hash = %pending.tx_hash, "Resuming pending anchor");
        self.settle(ledger.as_ref(), id, &pending, actor).await
    }

    /// Wait on a sent submission and persist whatever it resolved to.
    async fn settle(
        &self,
        ledger: &dyn LedgerAnchor,
        id: RecordId,
        pending: &PendingAnchor,
        actor: ActorId,
    ) -> EvidenceResult<AnchorOutcome> {
        let handle = SubmissionHandle {
            tx_hash: pending.tx_hash.clone(),
        };
        let content_hash = pending.content_hash.clone();

        let confirmation = match evidentia_ledger::await_outcome(ledger, &handle).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                // The write may have landed; keep the handle for resume.
                warn!(record_id = %id, tx_hash = %handle, error = %e, "Could not resolve submission");
                Confirmation::Timeout {
                    tx_hash: handle.tx_hash.clone(),
                }
            },
        };

        match confirmation {
            Confirmation::Confirmed(pointer) => {
                let (row, ()) = self
                    .mirror
                    .update(id, |row| {
                        // A concurrent resume may have got here first.
                        if row.ledger.is_none() {
                            row.ledger = Some(pointer.clone());
                            row.anchored_content_hash = Some(content_hash.clone());
                        }
                        if row.pending.as_ref().is_some_and(|p| p.tx_hash == handle.tx_hash) {
                            row.pending = None;
                        }
                        Ok(())
                    })
                    .await?;
                let pointer = row.ledger.unwrap_or(pointer);
                let content_hash = row.anchored_content_hash.unwrap_or(content_hash);
                self.note(
                    actor,
                    AuditAction::AnchorConfirmed,
                    &format!("{id} index:{} tx:{}", pointer.index, pointer.tx_hash),
                )
                .await;
                Ok(AnchorOutcome::Anchored {
                    pointer,
                    content_hash,
                })
            },
            Confirmation::Reverted { tx_hash, reason } => {
                self.mirror
                    .update(id, |row| {
                        if row.pending.as_ref().is_some_and(|p| p.tx_hash == tx_hash) {
                            row.pending = None;
                        }
                        Ok(())
                    })
                    .await?;
                self.note(
                    actor,
                    AuditAction::AnchorRejected,
                    &format!("{id} tx:{tx_hash} {reason}"),
                )
                .await;
                Ok(AnchorOutcome::Rejected { tx_hash, reason })
            },
            Confirmation::Timeout { tx_hash } => {
                self.note(actor, AuditAction::AnchorPending, &format!("{id} tx:{tx_hash}"))
                    .await;
                Ok(AnchorOutcome::Pending { tx_hash })
            },
        }
    }

    /// Re-fetch the ledger copy of a record, recompute its hash and store
    /// the verdict on the row. Only the latest verdict is kept.
    ///
    /// # Errors
    ///
    /// - [`EvidenceError::Authorization`] if `actor` does not own the row
    /// - [`EvidenceError::LedgerUnavailable`] if the ledger cannot be read;
    ///   the stored flag is left as it was
    pub async fn verify(&self, id: RecordId, actor: ActorId) -> EvidenceResult<VerificationReport> {
        let _row = self.lock_row(id).await;

        let row = self.owned_row(id, actor, "verify").await?;
        let Some(pointer) = row.ledger.clone() else {
            self.note(actor, AuditAction::VerificationSkipped, &format!("{id} not anchored"))
                .await;
            return Ok(ReconciliationVerifier::skipped(id));
        };

        let ledger = self.require_ledger()?;
        let on_chain = match ledger.fetch_by_index(pointer.index).await {
            Ok(record) => record,
            Err(e) => {
                let err = EvidenceError::from(e);
                self.note(actor, AuditAction::VerificationFailed, &format!("{id} {err}"))
                    .await;
                return Err(err);
            },
        };

        let report = ReconciliationVerifier::reconcile(
            id,
            &pointer,
            &on_chain,
            row.anchored_content_hash.as_deref(),
        );

        let flag = report.status.flag();
        self.mirror
            .update(id, |row| {
                row.verified = flag;
                Ok(())
            })
            .await?;

        let action = match report.status {
            VerificationStatus::Verified => AuditAction::EvidenceVerified,
            VerificationStatus::Tampered => AuditAction::EvidenceTampered,
            VerificationStatus::Skipped => AuditAction::VerificationSkipped,
        };
        if report.status == VerificationStatus::Tampered {
            warn!(
                record_id = %id,
                index = pointer.index,
                calculated = ?report.calculated_hash,
                on_chain = ?report.on_chain_hash,
                "Ledger copy does not match"
            );
        }
        self.note(actor, action, &format!("{id} index:{}", pointer.index))
            .await;
        Ok(report)
    }

    /// Decrypted view of a row, for its owner only.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::NotFound`] or
    /// [`EvidenceError::Authorization`].
    pub async fn get(&self, id: RecordId, actor: ActorId) -> EvidenceResult<EvidenceView> {
        let row = self.owned_row(id, actor, "view").await?;
        self.note(actor, AuditAction::EvidenceViewed, &id.to_string())
            .await;
        Ok(EvidenceView::open(&row, self.cipher.as_ref()))
    }

    /// Decrypted views of every row `actor` owns, in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if rows cannot be read.
    pub async fn list(&self, actor: ActorId) -> EvidenceResult<Vec<EvidenceView>> {
        let views: Vec<EvidenceView> = self
            .mirror
            .all()
            .await?
            .iter()
            .filter(|row| row.is_owned_by(actor))
            .map(|row| EvidenceView::open(row, self.cipher.as_ref()))
            .collect();
        self.note(actor, AuditAction::EvidenceListed, &format!("count:{}", views.len()))
            .await;
        Ok(views)
    }
}

impl fmt::Debug for EvidenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceStore")
            .field("mirror", &self.mirror)
            .field("cipher_degraded", &self.cipher.is_degraded())
            .field("has_ledger", &self.ledger.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_crypto::{AesFieldCipher, FieldKey};
    use evidentia_storage::MemoryKvStore;

    const OWNER: ActorId = ActorId::new(7);
    const STRANGER: ActorId = ActorId::new(8);

    fn store() -> EvidenceStore {
        EvidenceStore::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(AesFieldCipher::new(Some(&FieldKey::generate()))),
            Arc::new(AuditChain::in_memory()),
        )
    }

    fn input(post_id: &str) -> EvidenceInput {
        EvidenceInput::from_json(&format!(
            r#"{{"version":1,"post_id":"{post_id}","content":"Suspect claims X",
                "author_handle":"user1","timestamp":"2024-01-01T00:00:00"}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_for_owner() {
        let store = store();
        let id = store.create(input("100"), OWNER, None).await.unwrap();

        let view = store.get(id, OWNER).await.unwrap();
        assert_eq!(view.content, "Suspect claims X");
        assert_eq!(view.ledger, None);
        assert_eq!(view.verified, evidentia_core::VerifiedFlag::Unset);

        let actions: Vec<String> = store
            .audit()
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, ["evidence_captured", "evidence_viewed"]);
    }

    #[tokio::test]
    async fn test_get_by_stranger_is_denied_and_audited() {
        let store = store();
        let id = store.create(input("100"), OWNER, None).await.unwrap();

        assert!(matches!(
            store.get(id, STRANGER).await,
            Err(EvidenceError::Authorization { .. })
        ));
        let last = store.audit().entries().await.unwrap().pop().unwrap();
        assert_eq!(last.action, "access_denied");
        assert_eq!(last.actor, STRANGER);
    }

    #[tokio::test]
    async fn test_list_only_shows_own_rows() {
        let store = store();
        store.create(input("1"), OWNER, None).await.unwrap();
        store.create(input("2"), STRANGER, None).await.unwrap();
        store.create(input("3"), OWNER, None).await.unwrap();

        let posts: Vec<String> = store
            .list(OWNER)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.post_id)
            .collect();
        assert_eq!(posts, ["1", "3"]);
    }

    #[tokio::test]
    async fn test_anchor_without_ledger_is_configuration_error() {
        let store = store();
        let id = store.create(input("100"), OWNER, None).await.unwrap();
        assert!(matches!(
            store.anchor(id, OWNER).await,
            Err(EvidenceError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_unanchored_is_skipped_without_ledger() {
        let store = store();
        let id = store.create(input("100"), OWNER, None).await.unwrap();
        let report = store.verify(id, OWNER).await.unwrap();
        assert_eq!(report.status, VerificationStatus::Skipped);
        assert!(store.row_locks.is_empty());
        assert_eq!(
            store.get(id, OWNER).await.unwrap().verified,
            evidentia_core::VerifiedFlag::Unset
        );
    }

    #[tokio::test]
    async fn test_invalid_classification_rejected() {
        let store = store();
        let bad = Classification {
            category: "threat".into(),
            confidence: 1.5,
        };
        assert!(matches!(
            store.create(input("100"), OWNER, Some(bad)).await,
            Err(EvidenceError::Validation(_))
        ));
    }
}
