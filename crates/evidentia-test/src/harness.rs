//! Test harness helpers.

use std::path::PathBuf;
use std::sync::Arc;

use evidentia_audit::AuditChain;
use evidentia_crypto::{AesFieldCipher, FieldCipher, FieldKey};
use evidentia_evidence::EvidenceStore;
use evidentia_storage::{KvStore, MemoryKvStore, SqliteKvStore};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::mocks::MockLedger;

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a
/// subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// An [`EvidenceStore`] wired to a [`MockLedger`], with handles to every
/// collaborator so tests can inspect or sabotage them.
pub struct TestHarness {
    /// The store under test.
    pub store: EvidenceStore,
    /// The ledger behind it.
    pub ledger: MockLedger,
    /// Shared key-value backend (mirror and audit namespaces).
    pub kv: Arc<dyn KvStore>,
    /// The audit chain the store writes to.
    pub audit: Arc<AuditChain>,
    /// The cipher the store uses.
    pub cipher: Arc<dyn FieldCipher>,
    db_path: Option<PathBuf>,
    _dir: Option<TempDir>,
}

impl TestHarness {
    /// In-memory store with a random key and an including ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(MemoryKvStore::new()),
            Arc::new(AesFieldCipher::new(Some(&FieldKey::generate()))),
            MockLedger::new(),
            None,
        )
    }

    /// In-memory store around a prepared ledger.
    #[must_use]
    pub fn with_ledger(ledger: MockLedger) -> Self {
        Self::with_parts(
            Arc::new(MemoryKvStore::new()),
            Arc::new(AesFieldCipher::new(Some(&FieldKey::generate()))),
            ledger,
            None,
        )
    }

    /// In-memory store whose cipher has no key (identity mode).
    #[must_use]
    pub fn degraded() -> Self {
        Self::with_parts(
            Arc::new(MemoryKvStore::new()),
            Arc::new(AesFieldCipher::new(None)),
            MockLedger::new(),
            None,
        )
    }

    /// SQLite-backed store in a temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or database cannot be created.
    #[must_use]
    pub fn on_disk() -> Self {
        Self::on_disk_with_ledger(MockLedger::new())
    }

    /// SQLite-backed store around a prepared ledger.
    ///
    /// # Panics
    ///
    /// Panics if the directory or database cannot be created.
    #[must_use]
    pub fn on_disk_with_ledger(ledger: MockLedger) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("evidentia.db");
        let db = SqliteKvStore::open(&path).expect("Failed to open SQLite store");
        let mut harness = Self::with_parts(
            Arc::new(db),
            Arc::new(AesFieldCipher::new(Some(&FieldKey::generate()))),
            ledger,
            Some(dir),
        );
        harness.db_path = Some(path);
        harness
    }

    /// A second store over the same database file, with its own
    /// connection and audit chain but the same key and ledger, standing
    /// in for another process.
    ///
    /// # Panics
    ///
    /// Panics if the harness is not on disk or the file cannot be opened.
    #[must_use]
    pub fn open_sibling(&self) -> EvidenceStore {
        let path = self
            .db_path
            .as_ref()
            .expect("open_sibling needs an on-disk harness");
        let kv: Arc<dyn KvStore> =
            Arc::new(SqliteKvStore::open(path).expect("Failed to reopen SQLite store"));
        let audit = Arc::new(AuditChain::with_store(
            Arc::clone(&kv),
            evidentia_audit::DEFAULT_SOURCE_ADDRESS,
        ));
        EvidenceStore::new(kv, Arc::clone(&self.cipher), audit)
            .with_ledger(Arc::new(self.ledger.clone()))
    }

    fn with_parts(
        kv: Arc<dyn KvStore>,
        cipher: Arc<dyn FieldCipher>,
        ledger: MockLedger,
        dir: Option<TempDir>,
    ) -> Self {
        let audit = Arc::new(AuditChain::with_store(
            Arc::clone(&kv),
            evidentia_audit::DEFAULT_SOURCE_ADDRESS,
        ));
        let store = EvidenceStore::new(Arc::clone(&kv), Arc::clone(&cipher), Arc::clone(&audit))
            .with_ledger(Arc::new(ledger.clone()));
        Self {
            store,
            ledger,
            kv,
            audit,
            cipher,
            db_path: None,
            _dir: dir,
        }
    }

    /// Audit actions recorded so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the audit chain cannot be read.
    pub async fn audit_actions(&self) -> Vec<String> {
        self.audit
            .entries()
            .await
            .expect("Failed to read audit chain")
            .into_iter()
            .map(|e| e.action)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("store", &self.store)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
