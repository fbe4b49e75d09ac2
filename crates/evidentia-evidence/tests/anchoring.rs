//! Anchoring through `EvidenceStore` against the mock ledger.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use evidentia_core::{EvidenceError, RecordId};
use evidentia_evidence::AnchorOutcome;
use evidentia_ledger::LedgerAnchor;
use evidentia_test::prelude::*;

const REFERENCE_HASH: &str = "f6b38cca9198483468a9ff84619d9e0fb730610f5116e19192b95112ad7f3a7d";

async fn captured(h: &TestHarness) -> RecordId {
    h.store
        .create(sample_input(), INVESTIGATOR, Some(sample_classification()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_anchor_stores_pointers_and_reference_hash() {
    let h = TestHarness::new();
    let id = captured(&h).await;

    let outcome = h.store.anchor(id, INVESTIGATOR).await.unwrap();
    let AnchorOutcome::Anchored {
        pointer,
        content_hash,
    } = outcome
    else {
        panic!("expected anchored");
    };
    assert_eq!(pointer.index, 0);
    assert_eq!(content_hash, REFERENCE_HASH);

    let on_chain = h.ledger.fetch_by_index(0).await.unwrap().record;
    assert_eq!(on_chain.content_hash, REFERENCE_HASH);
    assert_eq!(on_chain.investigator, INVESTIGATOR.to_string());
    assert_eq!(on_chain.classification, "threat");
    assert_eq!(on_chain.confidence.raw(), 8750);
    assert_eq!(on_chain.media_urls, vec!["https://media.example/1.jpg".to_string()]);

    let view = h.store.get(id, INVESTIGATOR).await.unwrap();
    assert_eq!(view.ledger, Some(pointer));
    assert_eq!(view.anchored_content_hash.as_deref(), Some(REFERENCE_HASH));
    assert_eq!(view.pending_tx, None);
}

#[tokio::test]
async fn test_second_anchor_is_refused_without_resubmitting() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.store.anchor(id, INVESTIGATOR).await.unwrap();

    let err = h.store.anchor(id, INVESTIGATOR).await.unwrap_err();
    assert!(matches!(err, EvidenceError::AlreadyAnchored { index: 0, .. }));
    assert_eq!(h.ledger.submissions(), 1);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(h.audit_actions().await.last().unwrap(), "anchor_refused");
}

#[tokio::test]
async fn test_concurrent_anchors_submit_once() {
    let h = Arc::new(TestHarness::with_ledger(
        MockLedger::new().with_submit_delay(Duration::from_millis(50)),
    ));
    let id = captured(&h).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move { h.store.anchor(id, INVESTIGATOR).await }));
    }

    let mut anchored = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(AnchorOutcome::Anchored { .. }) => anchored += 1,
            Err(EvidenceError::AlreadyAnchored { .. }) => refused += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!((anchored, refused), (1, 7));
    assert_eq!(h.ledger.submissions(), 1);
}

#[tokio::test]
async fn test_independent_records_anchor_concurrently() {
    let h = Arc::new(TestHarness::new());
    let mut ids = Vec::new();
    for post in ["1", "2", "3", "4"] {
        ids.push(
            h.store
                .create(sample_input_for(post, "text"), INVESTIGATOR, None)
                .await
                .unwrap(),
        );
    }

    let results = futures::future::join_all(ids.iter().map(|id| {
        let h = Arc::clone(&h);
        let id = *id;
        async move { h.store.anchor(id, INVESTIGATOR).await }
    }))
    .await;

    let mut indices: Vec<u64> = results
        .into_iter()
        .map(|r| match r.unwrap() {
            AnchorOutcome::Anchored { pointer, .. } => pointer.index,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, [0, 1, 2, 3]);
}

#[tokio::test]
async fn test_failed_estimate_still_anchors() {
    let h = TestHarness::with_ledger(MockLedger::new().with_estimate_failure());
    let id = captured(&h).await;
    assert!(matches!(
        h.store.anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Anchored { .. }
    ));
}

#[tokio::test]
async fn test_unavailable_ledger_is_an_outcome_and_retryable() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_submit_failure(true);

    let outcome = h.store.anchor(id, INVESTIGATOR).await.unwrap();
    assert!(matches!(outcome, AnchorOutcome::Unavailable { .. }));
    assert!(outcome.is_retryable());
    assert_eq!(h.ledger.submissions(), 0);
    assert_eq!(h.audit_actions().await.last().unwrap(), "anchor_failed");

    h.ledger.set_submit_failure(false);
    assert!(matches!(
        h.store.anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Anchored { .. }
    ));
}

#[tokio::test]
async fn test_revert_is_conclusive_and_leaves_row_unanchored() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_next(NextSubmission::Revert);

    let outcome = h.store.anchor(id, INVESTIGATOR).await.unwrap();
    assert!(matches!(outcome, AnchorOutcome::Rejected { .. }));
    assert!(!outcome.is_retryable());

    let view = h.store.get(id, INVESTIGATOR).await.unwrap();
    assert_eq!(view.ledger, None);
    assert_eq!(view.pending_tx, None);
}

#[tokio::test]
async fn test_timeout_leaves_pending_handle_and_blocks_resubmit() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_next(NextSubmission::Stall);

    let AnchorOutcome::Pending { tx_hash } = h.store.anchor(id, INVESTIGATOR).await.unwrap() else {
        panic!("expected pending");
    };
    assert_eq!(
        h.store.get(id, INVESTIGATOR).await.unwrap().pending_tx.as_deref(),
        Some(tx_hash.as_str())
    );

    let err = h.store.anchor(id, INVESTIGATOR).await.unwrap_err();
    assert!(matches!(err, EvidenceError::AnchorPending { .. }));
    assert_eq!(h.ledger.submissions(), 1);

    // Still in flight: resume reports pending again.
    assert!(matches!(
        h.store.resume_anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Pending { .. }
    ));

    h.ledger.include_in_flight();
    let outcome = h.store.resume_anchor(id, INVESTIGATOR).await.unwrap();
    let AnchorOutcome::Anchored { pointer, content_hash } = outcome else {
        panic!("expected anchored after inclusion");
    };
    assert_eq!(pointer.tx_hash, tx_hash);
    assert_eq!(content_hash, REFERENCE_HASH);
    assert_eq!(h.ledger.submissions(), 1);

    let view = h.store.get(id, INVESTIGATOR).await.unwrap();
    assert_eq!(view.pending_tx, None);
    assert!(view.ledger.is_some());
}

#[tokio::test]
async fn test_reverted_pending_handle_is_cleared() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_next(NextSubmission::Stall);
    h.store.anchor(id, INVESTIGATOR).await.unwrap();

    h.ledger.revert_in_flight();
    assert!(matches!(
        h.store.resume_anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Rejected { .. }
    ));

    // The caller may now decide to submit again.
    h.ledger.set_next(NextSubmission::Include);
    assert!(matches!(
        h.store.anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Anchored { .. }
    ));
    assert_eq!(h.ledger.submissions(), 2);
}

#[tokio::test]
async fn test_resume_without_pending_is_rejected() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    assert!(matches!(
        h.store.resume_anchor(id, INVESTIGATOR).await,
        Err(EvidenceError::Validation(_))
    ));
}

#[tokio::test]
async fn test_stranger_cannot_anchor() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    assert!(matches!(
        h.store.anchor(id, OTHER_INVESTIGATOR).await,
        Err(EvidenceError::Authorization { .. })
    ));
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_anchoring_audit_trail() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.store.anchor(id, INVESTIGATOR).await.unwrap();

    assert_eq!(
        h.audit_actions().await,
        ["evidence_captured", "anchor_submitted", "anchor_confirmed"]
    );
    assert_eq!(h.audit.verify_chain().await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_stores_on_one_database_submit_once() {
    let h = TestHarness::on_disk_with_ledger(
        MockLedger::new().with_submit_delay(Duration::from_millis(200)),
    );
    let sibling = h.open_sibling();
    let id = captured(&h).await;

    let (a, b) = tokio::join!(h.store.anchor(id, INVESTIGATOR), sibling.anchor(id, INVESTIGATOR));

    let outcomes = [a, b];
    let anchored = outcomes
        .iter()
        .filter(|r| matches!(r, Ok(AnchorOutcome::Anchored { .. })))
        .count();
    let refused = outcomes
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(EvidenceError::AnchorInFlight { .. } | EvidenceError::AlreadyAnchored { .. })
            )
        })
        .count();
    assert_eq!((anchored, refused), (1, 1));
    assert_eq!(h.ledger.submissions(), 1);
    assert_eq!(h.ledger.len(), 1);

    let view = sibling.get(id, INVESTIGATOR).await.unwrap();
    assert!(view.ledger.is_some());
    assert!(!view.submitting);
    assert_eq!(h.audit.verify_chain().await.unwrap(), None);
}

#[tokio::test]
async fn test_uncertain_send_is_kept_pending_not_retried() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_next(NextSubmission::Stall);
    h.ledger.set_send_uncertain(true);

    let outcome = h.store.anchor(id, INVESTIGATOR).await.unwrap();
    let AnchorOutcome::Pending { tx_hash } = outcome else {
        panic!("expected pending, got {outcome:?}");
    };

    // A retry would sign a second transaction; it is refused instead.
    h.ledger.set_send_uncertain(false);
    assert!(matches!(
        h.store.anchor(id, INVESTIGATOR).await,
        Err(EvidenceError::AnchorPending { .. })
    ));
    assert_eq!(h.ledger.submissions(), 1);

    h.ledger.include_in_flight();
    let outcome = h.store.resume_anchor(id, INVESTIGATOR).await.unwrap();
    let AnchorOutcome::Anchored { pointer, .. } = outcome else {
        panic!("expected anchored after inclusion, got {outcome:?}");
    };
    assert_eq!(pointer.tx_hash, tx_hash);
}

#[tokio::test]
async fn test_uncertain_send_that_landed_anchors() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_send_uncertain(true);

    assert!(matches!(
        h.store.anchor(id, INVESTIGATOR).await.unwrap(),
        AnchorOutcome::Anchored { .. }
    ));
    assert_eq!(h.ledger.submissions(), 1);
    assert_eq!(
        h.audit_actions().await,
        ["evidence_captured", "anchor_submitted", "anchor_confirmed"]
    );
}

#[tokio::test]
async fn test_failed_submit_releases_claim() {
    let h = TestHarness::new();
    let id = captured(&h).await;
    h.ledger.set_submit_failure(true);

    h.store.anchor(id, INVESTIGATOR).await.unwrap();
    let view = h.store.get(id, INVESTIGATOR).await.unwrap();
    assert!(!view.submitting);
    assert_eq!(view.pending_tx, None);
}
