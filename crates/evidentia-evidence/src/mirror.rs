//! Local encrypted mirror of evidence records.

use std::sync::Arc;

use evidentia_core::{
    ActorId, CaptureTimestamp, CapturedArtifact, Classification, EvidenceError, EvidenceResult,
    LedgerPointer, PostId, RecordId, Timestamp, VerifiedFlag,
};
use evidentia_crypto::FieldCipher;
use evidentia_storage::{KvStore, ScopedKvStore, sequence_key};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Namespace holding mirror rows, keyed by zero-padded record id.
pub const MIRROR_NAMESPACE: &str = "mirror";

/// A submission that left this process but has not been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnchor {
    /// Transaction to re-query.
    pub tx_hash: String,
    /// Canonical hash that was submitted.
    pub content_hash: String,
    /// When the submission was sent.
    pub submitted_at: String,
}

/// A caller's exclusive right to submit this row, taken in storage before
/// anything is sent and replaced by a [`PendingAnchor`] once it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorClaim {
    /// Canonical hash about to be submitted.
    pub content_hash: String,
    /// When the claim was taken.
    pub claimed_at: String,
}

/// One mirror row. Displayable fields are stored encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMirrorRecord {
    /// Auto-increment id.
    pub id: RecordId,
    /// Investigator who captured the record; the only actor allowed to
    /// read, anchor or verify it.
    pub investigator: ActorId,
    /// Platform post id (plaintext).
    pub post_id: String,
    /// Source platform.
    pub platform: String,
    /// Canonical capture time (plaintext).
    pub timestamp: String,
    /// Encrypted post text.
    pub content: String,
    /// Encrypted author handle.
    pub author_handle: String,
    /// Encrypted JSON array of media URLs.
    pub media_urls: String,
    /// Encrypted engagement JSON.
    pub engagement_metrics: String,
    /// Classifier output, when one ran.
    #[serde(default)]
    pub classification: Option<Classification>,
    /// Whether the investigator's submitted text matched the fetched
    /// content. `None` when nothing was submitted.
    #[serde(default)]
    pub submitted_text_matches: Option<bool>,
    /// Ledger location; set once.
    #[serde(default)]
    pub ledger: Option<LedgerPointer>,
    /// Canonical hash written to the ledger; set together with `ledger`.
    #[serde(default)]
    pub anchored_content_hash: Option<String>,
    /// Submission in progress, before a transaction hash exists.
    #[serde(default)]
    pub claim: Option<AnchorClaim>,
    /// Outstanding submission, if the last anchor attempt timed out.
    #[serde(default)]
    pub pending: Option<PendingAnchor>,
    /// Outcome of the latest verification.
    #[serde(default)]
    pub verified: VerifiedFlag,
    /// When the row was created.
    pub captured_at: String,
}

impl LocalMirrorRecord {
    /// Encrypt an artifact into a new row.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or serialization fails.
    pub fn seal(
        id: RecordId,
        investigator: ActorId,
        artifact: &CapturedArtifact,
        classification: Option<Classification>,
        cipher: &dyn FieldCipher,
    ) -> EvidenceResult<Self> {
        let media = serde_json::to_string(&artifact.media_urls)
            .map_err(|e| EvidenceError::Validation(format!("media urls: {e}")))?;

        Ok(Self {
            id,
            investigator,
            post_id: artifact.post_id.as_str().to_string(),
            platform: artifact.platform.clone(),
            timestamp: artifact.timestamp.as_str().to_string(),
            content: cipher.encrypt(&artifact.content)?,
            author_handle: cipher.encrypt(&artifact.author_handle)?,
            media_urls: cipher.encrypt(&media)?,
            engagement_metrics: cipher.encrypt(&artifact.engagement_metrics.to_string())?,
            classification,
            submitted_text_matches: artifact.matches_submitted_text(),
            ledger: None,
            anchored_content_hash: None,
            claim: None,
            pending: None,
            verified: VerifiedFlag::Unset,
            captured_at: Timestamp::now().to_audit_string(),
        })
    }

    /// Rebuild the captured artifact for hashing and anchoring.
    ///
    /// Decryption failures fall back to the stored value, so a row sealed
    /// under a different key would hash its ciphertext. The media list is
    /// structured and its blob must parse; that is used to detect a wrong
    /// key before anything is anchored.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Crypto`] if the row does not decrypt under
    /// the current key.
    pub fn unseal(&self, cipher: &dyn FieldCipher) -> EvidenceResult<CapturedArtifact> {
        let media = cipher.decrypt(&self.media_urls);
        let media_urls: Vec<String> = serde_json::from_str(&media).map_err(|_| {
            EvidenceError::Crypto(format!(
                "{} does not decrypt under the configured key",
                self.id
            ))
        })?;

        Ok(CapturedArtifact {
            post_id: PostId::new(self.post_id.clone())?,
            content: cipher.decrypt(&self.content),
            author_handle: cipher.decrypt(&self.author_handle),
            timestamp: CaptureTimestamp::parse(&self.timestamp)?,
            platform: self.platform.clone(),
            media_urls,
            engagement_metrics: decrypt_json(cipher, &self.engagement_metrics),
            submitted_text: None,
        })
    }

    /// Whether `actor` owns this row.
    #[must_use]
    pub fn is_owned_by(&self, actor: ActorId) -> bool {
        self.investigator == actor
    }

    /// Refuse a new submission if the row is anchored, has a submission
    /// outstanding, or is being submitted.
    ///
    /// # Errors
    ///
    /// [`EvidenceError::AlreadyAnchored`], [`EvidenceError::AnchorPending`]
    /// or [`EvidenceError::AnchorInFlight`].
    pub fn ensure_unanchored(&self) -> EvidenceResult<()> {
        if let Some(pointer) = &self.ledger {
            return Err(EvidenceError::AlreadyAnchored {
                record: self.id.to_string(),
                index: pointer.index,
            });
        }
        if let Some(pending) = &self.pending {
            return Err(EvidenceError::AnchorPending {
                record: self.id.to_string(),
                tx_hash: pending.tx_hash.clone(),
            });
        }
        if self.claim.is_some() {
            return Err(EvidenceError::AnchorInFlight {
                record: self.id.to_string(),
            });
        }
        Ok(())
    }
}

fn decrypt_json(cipher: &dyn FieldCipher, blob: &str) -> Value {
    let plain = cipher.decrypt(blob);
    serde_json::from_str(&plain).unwrap_or(Value::String(plain))
}

/// Decrypted view of a mirror row, as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceView {
    /// Record id.
    pub id: RecordId,
    /// Owning investigator.
    pub investigator: ActorId,
    /// Platform post id.
    pub post_id: String,
    /// Source platform.
    pub platform: String,
    /// Canonical capture time.
    pub timestamp: String,
    /// Post text.
    pub content: String,
    /// Author handle.
    pub author_handle: String,
    /// Media URLs.
    pub media_urls: Vec<String>,
    /// Engagement counters.
    pub engagement_metrics: Value,
    /// Classifier output.
    pub classification: Option<Classification>,
    /// Submitted-text cross-check.
    pub submitted_text_matches: Option<bool>,
    /// Ledger location.
    pub ledger: Option<LedgerPointer>,
    /// Anchored canonical hash.
    pub anchored_content_hash: Option<String>,
    /// Outstanding submission.
    pub pending_tx: Option<String>,
    /// A submission is being sent right now.
    pub submitting: bool,
    /// Latest verification outcome.
    pub verified: VerifiedFlag,
    /// Row creation time.
    pub captured_at: String,
}

impl EvidenceView {
    /// Decrypt a row. Fields that do not decrypt are shown as stored.
    #[must_use]
    pub fn open(record: &LocalMirrorRecord, cipher: &dyn FieldCipher) -> Self {
        let media = cipher.decrypt(&record.media_urls);
        Self {
            id: record.id,
            investigator: record.investigator,
            post_id: record.post_id.clone(),
            platform: record.platform.clone(),
            timestamp: record.timestamp.clone(),
            content: cipher.decrypt(&record.content),
            author_handle: cipher.decrypt(&record.author_handle),
            media_urls: serde_json::from_str(&media).unwrap_or_else(|_| vec![media]),
            engagement_metrics: decrypt_json(cipher, &record.engagement_metrics),
            classification: record.classification.clone(),
            submitted_text_matches: record.submitted_text_matches,
            ledger: record.ledger.clone(),
            anchored_content_hash: record.anchored_content_hash.clone(),
            pending_tx: record.pending.as_ref().map(|p| p.tx_hash.clone()),
            submitting: record.claim.is_some(),
            verified: record.verified,
            captured_at: record.captured_at.clone(),
        }
    }
}

/// Persistence for mirror rows.
///
/// Each row is one value under its id. [`update`](Self::update) is a
/// compare-and-swap loop, so read-modify-write cycles on one row never
/// lose each other's changes, even between processes on one database.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    rows: ScopedKvStore,
}

impl MirrorStore {
    /// Store rows in `store` under [`MIRROR_NAMESPACE`].
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            rows: ScopedKvStore::from_static(store, MIRROR_NAMESPACE),
        }
    }

    /// Allocate the next record id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn allocate_id(&self) -> EvidenceResult<RecordId> {
        Ok(RecordId(self.rows.next_sequence().await?))
    }

    /// Insert or replace a row.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails.
    pub async fn put(&self, record: &LocalMirrorRecord) -> EvidenceResult<()> {
        self.rows.set_json(&sequence_key(record.id.0), record).await?;
        Ok(())
    }

    /// Apply `change` to the current row and write it back only if nobody
    /// wrote the row in between; otherwise re-read and apply again.
    /// `change` may run more than once and must be deterministic over the
    /// row it is given. An error from `change` aborts without writing.
    ///
    /// # Errors
    ///
    /// [`EvidenceError::NotFound`], the error `change` returned, or a
    /// storage error.
    pub async fn update<T>(
        &self,
        id: RecordId,
        mut change: impl FnMut(&mut LocalMirrorRecord) -> EvidenceResult<T>,
    ) -> EvidenceResult<(LocalMirrorRecord, T)> {
        let key = sequence_key(id.0);
        loop {
            let current = self
                .rows
                .get(&key)
                .await?
                .ok_or_else(|| EvidenceError::NotFound(id.to_string()))?;
            let mut row: LocalMirrorRecord = serde_json::from_slice(&current)
                .map_err(|e| EvidenceError::Storage(format!("{id}: {e}")))?;

            let out = change(&mut row)?;
            let next = serde_json::to_vec(&row)
                .map_err(|e| EvidenceError::Storage(format!("{id}: {e}")))?;
            if self
                .rows
                .compare_and_swap(&key, Some(current.as_slice()), next)
                .await?
            {
                return Ok((row, out));
            }
            debug!(record_id = %id, "Mirror row changed underneath; retrying update");
        }
    }

    /// Read a row.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or storage fails.
    pub async fn get(&self, id: RecordId) -> EvidenceResult<Option<LocalMirrorRecord>> {
        Ok(self.rows.get_json(&sequence_key(id.0)).await?)
    }

    /// Read a row that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::NotFound`] if there is no such row.
    pub async fn require(&self, id: RecordId) -> EvidenceResult<LocalMirrorRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| EvidenceError::NotFound(id.to_string()))
    }

    /// All rows in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or storage fails.
    pub async fn all(&self) -> EvidenceResult<Vec<LocalMirrorRecord>> {
        Ok(self.rows.values_json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::EvidenceInput;
    use evidentia_crypto::{AesFieldCipher, FieldKey};
    use evidentia_storage::MemoryKvStore;

    fn artifact() -> CapturedArtifact {
        EvidenceInput::from_json(
            r#"{"version":1,"post_id":"100","content":"Suspect claims X",
                "author_handle":"user1","timestamp":"2024-01-01T00:00:00",
                "media_urls":["https://img/1.png"],"engagement_metrics":{"likes":4},
                "submitted_text":"suspect   claims x"}"#,
        )
        .unwrap()
        .validate()
        .unwrap()
    }

    #[test]
    fn test_seal_encrypts_displayable_fields() {
        let cipher = AesFieldCipher::new(Some(&FieldKey::generate()));
        let row =
            LocalMirrorRecord::seal(RecordId(1), ActorId::new(3), &artifact(), None, &cipher)
                .unwrap();

        assert_ne!(row.content, "Suspect claims X");
        assert_ne!(row.author_handle, "user1");
        assert!(!row.media_urls.contains("img"));
        assert_eq!(row.post_id, "100");
        assert_eq!(row.submitted_text_matches, Some(true));
        assert_eq!(row.verified, VerifiedFlag::Unset);

        let back = row.unseal(&cipher).unwrap();
        let mut expected = artifact();
        expected.submitted_text = None;
        assert_eq!(back, expected);
    }

    #[test]
    fn test_unseal_with_wrong_key_is_refused() {
        let cipher = AesFieldCipher::new(Some(&FieldKey::generate()));
        let other = AesFieldCipher::new(Some(&FieldKey::generate()));
        let row = LocalMirrorRecord::seal(RecordId(1), ActorId::new(3), &artifact(), None, &cipher)
            .unwrap();
        assert!(matches!(row.unseal(&other), Err(EvidenceError::Crypto(_))));
    }

    #[test]
    fn test_view_of_degraded_row() {
        let cipher = AesFieldCipher::new(None);
        let row = LocalMirrorRecord::seal(RecordId(2), ActorId::new(3), &artifact(), None, &cipher)
            .unwrap();
        assert_eq!(row.content, "Suspect claims X");

        let view = EvidenceView::open(&row, &cipher);
        assert_eq!(view.media_urls, vec!["https://img/1.png".to_string()]);
        assert_eq!(view.engagement_metrics["likes"], 4);
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = MirrorStore::new(Arc::new(MemoryKvStore::new()));
        let cipher = AesFieldCipher::new(None);
        let id = store.allocate_id().await.unwrap();
        assert_eq!(id, RecordId(1));

        let row = LocalMirrorRecord::seal(id, ActorId::new(3), &artifact(), None, &cipher).unwrap();
        store.put(&row).await.unwrap();
        assert_eq!(store.require(id).await.unwrap(), row);
        assert!(matches!(
            store.require(RecordId(9)).await,
            Err(EvidenceError::NotFound(_))
        ));
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_refuses_second_claim() {
        let store = MirrorStore::new(Arc::new(MemoryKvStore::new()));
        let cipher = AesFieldCipher::new(None);
        let id = store.allocate_id().await.unwrap();
        let row = LocalMirrorRecord::seal(id, ActorId::new(3), &artifact(), None, &cipher).unwrap();
        store.put(&row).await.unwrap();

        let claim = |row: &mut LocalMirrorRecord| -> EvidenceResult<()> {
            row.ensure_unanchored()?;
            row.claim = Some(AnchorClaim {
                content_hash: "ab".into(),
                claimed_at: "now".into(),
            });
            Ok(())
        };
        let (claimed, ()) = store.update(id, claim).await.unwrap();
        assert!(claimed.claim.is_some());
        assert!(matches!(
            store.update(id, claim).await,
            Err(EvidenceError::AnchorInFlight { .. })
        ));
        assert!(EvidenceView::open(&store.require(id).await.unwrap(), &cipher).submitting);

        assert!(matches!(
            store.update(RecordId(9), claim).await,
            Err(EvidenceError::NotFound(_))
        ));
    }
}
