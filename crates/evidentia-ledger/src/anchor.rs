//! The anchoring protocol and the capability set a ledger must offer.
//!
//! A ledger write is not idempotent, so nothing in this module retries.
//! [`submit_once`] estimates and sends exactly once, [`await_outcome`]
//! waits; whether to try again after a failure is the caller's decision.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use evidentia_core::{
    ActorId, CapturedArtifact, Classification, ConfidenceScaled, LedgerPointer,
};
use evidentia_crypto::{CanonicalHasher, ContentHash, CryptoResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LedgerResult;

/// Confirmation wait used when none is configured.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Classification written when the classifier produced nothing.
pub const UNCLASSIFIED: &str = "unclassified";

/// The tuple stored on the ledger for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Canonical hash, lowercase hex.
    pub content_hash: String,
    /// Platform post identifier.
    pub post_id: String,
    /// Canonical capture time.
    pub timestamp: String,
    /// Investigator that anchored the record.
    pub investigator: String,
    /// Post text.
    pub content: String,
    /// Post author handle.
    pub author_handle: String,
    /// Media URLs; empty when the post had none.
    pub media_urls: Vec<String>,
    /// Classification category.
    pub classification: String,
    /// Confidence as fixed point.
    pub confidence: ConfidenceScaled,
    /// Engagement counters as a JSON string.
    pub engagement_metrics: String,
}

impl LedgerRecord {
    /// Build the ledger tuple for an artifact whose canonical hash has
    /// already been computed.
    #[must_use]
    pub fn new(
        artifact: &CapturedArtifact,
        content_hash: &ContentHash,
        investigator: ActorId,
        classification: Option<(&Classification, ConfidenceScaled)>,
    ) -> Self {
        let (category, confidence) = classification.map_or_else(
            || (UNCLASSIFIED.to_string(), ConfidenceScaled::from_raw(0)),
            |(c, scaled)| (c.category.clone(), scaled),
        );
        let engagement_metrics = if artifact.engagement_metrics.is_null() {
            "{}".to_string()
        } else {
            artifact.engagement_metrics.to_string()
        };

        Self {
            content_hash: content_hash.to_hex(),
            post_id: artifact.post_id.as_str().to_string(),
            timestamp: artifact.timestamp.as_str().to_string(),
            investigator: investigator.to_string(),
            content: artifact.content.clone(),
            author_handle: artifact.author_handle.clone(),
            media_urls: artifact.media_urls.clone(),
            classification: category,
            confidence,
            engagement_metrics,
        }
    }

    /// Recompute the canonical hash from the fields the ledger returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a hashed field came back empty.
    pub fn recompute_hash(&self) -> CryptoResult<ContentHash> {
        CanonicalHasher::hash(
            &self.content,
            &self.author_handle,
            &self.post_id,
            &self.timestamp,
        )
    }
}

/// A record read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredRecord {
    /// Sequence index assigned by the ledger.
    pub index: u64,
    /// The anchoring transaction, when the lookup went through it.
    pub tx_hash: Option<String>,
    /// Stored fields.
    pub record: LedgerRecord,
}

/// Submission budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    /// Gas limit for the write.
    pub gas_limit: u64,
    /// Gas price in wei.
    pub gas_price_wei: u128,
    /// `false` when the fixed fallback budget was used.
    pub estimated: bool,
}

/// Identifies a sent submission so it can be re-queried later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// Transaction hash, `0x`-prefixed.
    pub tx_hash: String,
}

impl fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tx_hash)
    }
}

/// How waiting for a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Included and succeeded.
    Confirmed(LedgerPointer),
    /// Included and reverted. Conclusive.
    Reverted {
        /// The reverted transaction.
        tx_hash: String,
        /// Why, when the node says.
        reason: String,
    },
    /// Not included yet. Inclusion is still possible.
    Timeout {
        /// Transaction to re-query later.
        tx_hash: String,
    },
}

/// Capability set of an append-only evidence ledger.
#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    /// Budget for writing `record`. Implementations fall back to a fixed
    /// budget when estimation fails rather than erroring.
    async fn estimate_cost(&self, record: &LedgerRecord) -> LedgerResult<CostEstimate>;

    /// Send the write exactly once.
    async fn submit(
        &self,
        record: &LedgerRecord,
        cost: &CostEstimate,
    ) -> LedgerResult<SubmissionHandle>;

    /// Block until the submission is confirmed, reverted, or `timeout`
    /// elapses.
    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> LedgerResult<Confirmation>;

    /// Read the record stored at `index`.
    async fn fetch_by_index(&self, index: u64) -> LedgerResult<AnchoredRecord>;

    /// Read the record written by transaction `tx_hash`.
    async fn fetch_by_tx_hash(&self, tx_hash: &str) -> LedgerResult<AnchoredRecord>;

    /// Number of records on the ledger.
    async fn evidence_count(&self) -> LedgerResult<u64>;

    /// How long [`await_outcome`] waits for confirmation.
    fn confirmation_timeout(&self) -> Duration {
        DEFAULT_CONFIRMATION_TIMEOUT
    }
}

/// Estimate and send one submission for `record`.
///
/// Estimation failures fall back to the ledger's fixed budget inside
/// [`LedgerAnchor::estimate_cost`]; this only logs that it happened. The
/// returned handle must be persisted before waiting on it, so a crash
/// during the wait cannot lead to a second submission.
///
/// # Errors
///
/// Returns the ledger's error if estimation or submission fails. Except
/// for [`LedgerError::SendUncertain`](crate::LedgerError::SendUncertain),
/// which carries a hash to re-query, nothing was sent in that case.
pub async fn submit_once(
    ledger: &dyn LedgerAnchor,
    record: &LedgerRecord,
) -> LedgerResult<SubmissionHandle> {
    let cost = ledger.estimate_cost(record).await?;
    if !cost.estimated {
        warn!(
            gas_limit = cost.gas_limit,
            gas_price_wei = %cost.gas_price_wei,
            "Cost estimation failed; using fallback budget"
        );
    }

    let handle = ledger.submit(record, &cost).await?;
    info!(tx_hash = %handle, content_hash = %record.content_hash, "Submitted evidence to ledger");
    Ok(handle)
}

/// Wait for a submission with the ledger's configured timeout and log how
/// it ended.
///
/// # Errors
///
/// Returns the ledger's error if the confirmation path itself fails (for
/// example, the index of a confirmed write cannot be resolved).
pub async fn await_outcome(
    ledger: &dyn LedgerAnchor,
    handle: &SubmissionHandle,
) -> LedgerResult<Confirmation> {
    let outcome = ledger
        .await_confirmation(handle, ledger.confirmation_timeout())
        .await?;
    match &outcome {
        Confirmation::Confirmed(pointer) => {
            info!(tx_hash = %pointer.tx_hash, index = pointer.index, "Ledger confirmed evidence");
        },
        Confirmation::Reverted { tx_hash, reason } => {
            warn!(tx_hash = %tx_hash, reason = %reason, "Ledger reverted evidence submission");
        },
        Confirmation::Timeout { tx_hash } => {
            warn!(tx_hash = %tx_hash, "Timed out waiting for ledger confirmation");
        },
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_core::EvidenceInput;

    fn artifact(engagement: &str) -> CapturedArtifact {
        EvidenceInput::from_json(&format!(
            r#"{{"version":1,"post_id":"100","content":"Suspect claims X",
                "author_handle":"user1","timestamp":"2024-01-01T00:00:00",
                "engagement_metrics":{engagement}}}"#
        ))
        .unwrap()
        .validate()
        .unwrap()
    }

    #[test]
    fn test_record_from_artifact() {
        let artifact = artifact(r#"{"likes":2}"#);
        let hash = CanonicalHasher::hash_artifact(&artifact).unwrap();
        let classification = Classification::new("threat", 0.5).unwrap();
        let scaled = classification.scaled_confidence().unwrap();

        let record = LedgerRecord::new(
            &artifact,
            &hash,
            ActorId::new(9),
            Some((&classification, scaled)),
        );
        assert_eq!(record.content_hash, hash.to_hex());
        assert_eq!(record.investigator, "9");
        assert_eq!(record.confidence.raw(), 5000);
        assert_eq!(record.engagement_metrics, r#"{"likes":2}"#);
        assert!(record.media_urls.is_empty());
        assert_eq!(record.recompute_hash().unwrap(), hash);
    }

    #[test]
    fn test_record_without_classification() {
        let artifact = artifact("null");
        let hash = CanonicalHasher::hash_artifact(&artifact).unwrap();
        let record = LedgerRecord::new(&artifact, &hash, ActorId::new(1), None);
        assert_eq!(record.classification, UNCLASSIFIED);
        assert_eq!(record.confidence.raw(), 0);
        assert_eq!(record.engagement_metrics, "{}");
    }
}
