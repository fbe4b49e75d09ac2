//! Mock implementations for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use evidentia_core::{
    ArtifactFetcher, Classification, Classifier, EvidenceError, EvidenceResult, FetchedArtifact,
    LedgerPointer,
};
use evidentia_crypto::ContentHash;
use evidentia_ledger::{
    AnchoredRecord, Confirmation, CostEstimate, LedgerAnchor, LedgerError, LedgerRecord,
    LedgerResult, SubmissionHandle,
};

/// Where a submitted transaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TxState {
    Included(u64),
    Reverted,
    /// Sent, not yet included. Holds the submission number and the record
    /// that lands on inclusion.
    InFlight(usize, LedgerRecord),
}

/// What the next submission will do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NextSubmission {
    /// Included immediately.
    #[default]
    Include,
    /// Included and reverted.
    Revert,
    /// Stays in flight until [`MockLedger::include_in_flight`].
    Stall,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<LedgerRecord>,
    txs: HashMap<String, TxState>,
    next: NextSubmission,
    estimate_fails: bool,
    submit_fails: bool,
    send_uncertain: bool,
    reads_fail: bool,
    submit_delay: Option<Duration>,
    submissions: usize,
}

/// Deterministic in-process ledger.
///
/// Submissions are included (or reverted, or left in flight) according to
/// [`NextSubmission`]; confirmation never sleeps, so a stalled submission
/// reports a timeout immediately.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    /// Create an empty ledger that includes every submission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make cost estimation fail (the ledger then reports the fallback budget).
    #[must_use]
    pub fn with_estimate_failure(self) -> Self {
        self.state().estimate_fails = true;
        self
    }

    /// Make submissions fail before anything is sent.
    pub fn set_submit_failure(&self, fails: bool) {
        self.state().submit_fails = fails;
    }

    /// Take each submission as usual but answer with
    /// [`LedgerError::SendUncertain`], as if the connection dropped after
    /// the node received the transaction.
    pub fn set_send_uncertain(&self, uncertain: bool) {
        self.state().send_uncertain = uncertain;
    }

    /// Make every read fail as if the node were unreachable.
    pub fn set_read_failure(&self, fails: bool) {
        self.state().reads_fail = fails;
    }

    /// Decide what the next submission does. Applies to every submission
    /// until changed.
    pub fn set_next(&self, next: NextSubmission) {
        self.state().next = next;
    }

    /// Delay each submission, to widen race windows in concurrency tests.
    #[must_use]
    pub fn with_submit_delay(self, delay: Duration) -> Self {
        self.state().submit_delay = Some(delay);
        self
    }

    /// Include every in-flight submission, in submission order.
    pub fn include_in_flight(&self) {
        let mut state = self.state();
        let mut in_flight: Vec<(usize, String, LedgerRecord)> = state
            .txs
            .iter()
            .filter_map(|(tx, s)| match s {
                TxState::InFlight(seq, record) => Some((*seq, tx.clone(), record.clone())),
                _ => None,
            })
            .collect();
        in_flight.sort_by_key(|(seq, _, _)| *seq);

        for (_, tx, record) in in_flight {
            let index = state.records.len() as u64;
            state.records.push(record);
            state.txs.insert(tx, TxState::Included(index));
        }
    }

    /// Revert every in-flight submission.
    pub fn revert_in_flight(&self) {
        for state in self.state().txs.values_mut() {
            if matches!(state, TxState::InFlight(..)) {
                *state = TxState::Reverted;
            }
        }
    }

    /// Edit the stored record at `index`, as an attacker with ledger
    /// write access would.
    ///
    /// # Panics
    ///
    /// Panics if there is no record at `index`.
    pub fn tamper(&self, index: u64, edit: impl FnOnce(&mut LedgerRecord)) {
        let mut state = self.state();
        let slot = usize::try_from(index).expect("index fits usize");
        edit(state.records.get_mut(slot).expect("no record at index"));
    }

    /// Number of submissions sent so far.
    #[must_use]
    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    /// Number of records on the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    /// Whether the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerAnchor for MockLedger {
    async fn estimate_cost(&self, _record: &LedgerRecord) -> LedgerResult<CostEstimate> {
        let estimated = !self.state().estimate_fails;
        Ok(CostEstimate {
            gas_limit: if estimated { 150_000 } else { 2_000_000 },
            gas_price_wei: 20_000_000_000,
            estimated,
        })
    }

    async fn submit(
        &self,
        record: &LedgerRecord,
        _cost: &CostEstimate,
    ) -> LedgerResult<SubmissionHandle> {
        let delay = self.state().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.submit_fails {
            return Err(LedgerError::Unavailable("mock node refused connection".into()));
        }

        state.submissions = state.submissions.saturating_add(1);
        let tx_hash = format!(
            "0x{}",
            ContentHash::hash(format!("tx-{}", state.submissions).as_bytes()).to_hex()
        );

        let next = state.next;
        let tx_state = match next {
            NextSubmission::Include => {
                let index = state.records.len() as u64;
                state.records.push(record.clone());
                TxState::Included(index)
            },
            NextSubmission::Revert => TxState::Reverted,
            NextSubmission::Stall => TxState::InFlight(state.submissions, record.clone()),
        };
        state.txs.insert(tx_hash.clone(), tx_state);
        if state.send_uncertain {
            return Err(LedgerError::SendUncertain {
                tx_hash,
                reason: "mock connection reset after send".into(),
            });
        }
        Ok(SubmissionHandle { tx_hash })
    }

    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
        _timeout: Duration,
    ) -> LedgerResult<Confirmation> {
        let state = self.state();
        let tx_hash = handle.tx_hash.clone();
        Ok(match state.txs.get(&tx_hash) {
            Some(TxState::Included(index)) => Confirmation::Confirmed(LedgerPointer {
                index: *index,
                tx_hash,
            }),
            Some(TxState::Reverted) => Confirmation::Reverted {
                tx_hash,
                reason: "execution reverted".into(),
            },
            Some(TxState::InFlight(..)) | None => Confirmation::Timeout { tx_hash },
        })
    }

    async fn fetch_by_index(&self, index: u64) -> LedgerResult<AnchoredRecord> {
        let state = self.state();
        if state.reads_fail {
            return Err(LedgerError::Unavailable("mock node unreachable".into()));
        }
        usize::try_from(index)
            .ok()
            .and_then(|slot| state.records.get(slot))
            .map(|record| AnchoredRecord {
                index,
                tx_hash: None,
                record: record.clone(),
            })
            .ok_or_else(|| LedgerError::NotFound(format!("ledger index {index}")))
    }

    async fn fetch_by_tx_hash(&self, tx_hash: &str) -> LedgerResult<AnchoredRecord> {
        let index = match self.state().txs.get(tx_hash) {
            Some(TxState::Included(index)) => *index,
            _ => return Err(LedgerError::NotFound(format!("transaction {tx_hash}"))),
        };
        let mut anchored = self.fetch_by_index(index).await?;
        anchored.tx_hash = Some(tx_hash.to_string());
        Ok(anchored)
    }

    async fn evidence_count(&self) -> LedgerResult<u64> {
        let state = self.state();
        if state.reads_fail {
            return Err(LedgerError::Unavailable("mock node unreachable".into()));
        }
        Ok(state.records.len() as u64)
    }
}

/// Artifact fetcher serving canned responses by locator.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    artifacts: Arc<Mutex<HashMap<String, FetchedArtifact>>>,
}

impl MockFetcher {
    /// Create a fetcher with no artifacts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `artifact` for `locator`.
    #[must_use]
    pub fn with_artifact(self, locator: impl Into<String>, artifact: FetchedArtifact) -> Self {
        if let Ok(mut guard) = self.artifacts.lock() {
            guard.insert(locator.into(), artifact);
        }
        self
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, locator: &str) -> EvidenceResult<FetchedArtifact> {
        self.artifacts
            .lock()
            .ok()
            .and_then(|g| g.get(locator).cloned())
            .ok_or_else(|| EvidenceError::NotFound(format!("artifact {locator}")))
    }
}

/// Classifier returning a fixed result, or failing.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    result: Option<Classification>,
}

impl MockClassifier {
    /// Always return `classification`.
    #[must_use]
    pub fn returning(classification: Classification) -> Self {
        Self {
            result: Some(classification),
        }
    }

    /// Always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, _content: &str) -> EvidenceResult<Classification> {
        self.result
            .clone()
            .ok_or_else(|| EvidenceError::Validation("classifier unavailable".into()))
    }
}
