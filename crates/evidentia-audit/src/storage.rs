//! Audit entry persistence over a [`KvStore`].

use std::sync::Arc;

use evidentia_storage::{
    ChainBuilder, KvEntry, KvStore, MemoryKvStore, ScopedKvStore, StorageError, StorageResult,
};

use crate::entry::{AuditEntry, GENESIS_PREV_HASH};
use crate::error::AuditResult;

/// Namespace holding audit entries, keyed by zero-padded sequence.
pub const AUDIT_NAMESPACE: &str = "audit";

/// Storage backend for the audit chain.
///
/// Entries are written once under their sequence key and never updated.
/// Linking to the previous entry and writing the next one is a single
/// storage-level atomic step, so every handle on the same backing store
/// (including other processes on one SQLite file) sees one linear chain.
#[derive(Debug, Clone)]
pub struct AuditStorage {
    entries: ScopedKvStore,
}

impl AuditStorage {
    /// Store entries in `store` under [`AUDIT_NAMESPACE`].
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            entries: ScopedKvStore::from_static(store, AUDIT_NAMESPACE),
        }
    }

    /// Volatile storage for tests and dry runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Build the next entry from the last entry's hash (or the genesis
    /// sentinel) and its sequence, and persist it in the same atomic step.
    pub(crate) async fn append_linked(
        &self,
        make: impl Fn(String, u64) -> AuditEntry + Send + Sync + 'static,
    ) -> AuditResult<AuditEntry> {
        let build: ChainBuilder =
            Arc::new(move |last: Option<&KvEntry>, sequence: u64| -> StorageResult<Vec<u8>> {
                let prev_hash = match last {
                    Some(row) => decode(&row.value)?.entry_hash,
                    None => GENESIS_PREV_HASH.to_string(),
                };
                serde_json::to_vec(&make(prev_hash, sequence))
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            });
        let row = self.entries.append_chained(build).await?;
        Ok(decode(&row.value)?)
    }

    /// The most recent entry.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    pub async fn last(&self) -> AuditResult<Option<AuditEntry>> {
        Ok(self.entries.last_json().await?)
    }

    /// All entries in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    pub async fn all(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self.entries.values_json().await?)
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn count(&self) -> AuditResult<usize> {
        Ok(self.entries.list_keys().await?.len())
    }
}

fn decode(bytes: &[u8]) -> StorageResult<AuditEntry> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
