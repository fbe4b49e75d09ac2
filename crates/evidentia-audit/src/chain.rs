//! Audit chain - the main interface for audit logging.

use std::sync::Arc;

use evidentia_core::{ActorId, Timestamp};
use evidentia_storage::KvStore;
use tracing::{debug, warn};

use crate::entry::{AuditEntry, GENESIS_PREV_HASH};
use crate::error::{AuditError, AuditResult};
use crate::storage::AuditStorage;

/// Source address recorded when the caller does not supply one.
pub const DEFAULT_SOURCE_ADDRESS: &str = "127.0.0.1";

/// Append-only, hash-linked audit log.
///
/// Appends are serialized by the storage backend: reading the last entry's
/// hash and writing the next entry are one atomic step, so concurrent
/// callers can never link two entries to the same predecessor. This holds
/// across chains and processes sharing one database, not just within one
/// `AuditChain`.
pub struct AuditChain {
    storage: AuditStorage,
    default_source: String,
}

impl AuditChain {
    /// Create a chain over the given storage.
    #[must_use]
    pub fn new(storage: AuditStorage, default_source: impl Into<String>) -> Self {
        Self {
            storage,
            default_source: default_source.into(),
        }
    }

    /// Create a chain persisted in `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn KvStore>, default_source: impl Into<String>) -> Self {
        Self::new(AuditStorage::new(store), default_source)
    }

    /// Create an in-memory chain (for testing).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(AuditStorage::in_memory(), DEFAULT_SOURCE_ADDRESS)
    }

    /// Append an entry from the local process.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous entry cannot be read or the new
    /// entry cannot be stored.
    pub async fn append(
        &self,
        actor: ActorId,
        action: impl AsRef<str>,
        details: &str,
    ) -> AuditResult<AuditEntry> {
        self.append_from(actor, action, details, &self.default_source)
            .await
    }

    /// Append an entry attributed to `source_address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous entry cannot be read or the new
    /// entry cannot be stored.
    pub async fn append_from(
        &self,
        actor: ActorId,
        action: impl AsRef<str>,
        details: &str,
        source_address: &str,
    ) -> AuditResult<AuditEntry> {
        let action = action.as_ref().to_owned();
        let details = details.to_owned();
        let source_address = source_address.to_owned();
        let make = move |prev_hash: String, sequence: u64| {
            AuditEntry::new(
                sequence,
                actor,
                action.as_str(),
                details.as_str(),
                source_address.as_str(),
                Timestamp::now().to_audit_string(),
                prev_hash,
            )
        };
        let entry = self.storage.append_linked(make).await?;

        debug!(
            sequence = entry.sequence,
            actor = %entry.actor,
            action = %entry.action,
            "Appended audit entry"
        );
        Ok(entry)
    }

    /// Walk the chain and return the zero-based position of the first
    /// entry that does not check out, or `None` if the chain is intact.
    ///
    /// Each entry is recomputed from its stored fields and the previous
    /// entry's stored hash. Nothing is repaired.
    ///
    /// # Errors
    ///
    /// Returns an error if entries cannot be read from storage.
    pub async fn verify_chain(&self) -> AuditResult<Option<u64>> {
        let entries = self.storage.all().await?;
        let mut prev_hash = GENESIS_PREV_HASH.to_string();

        for (position, entry) in (0u64..).zip(entries) {
            if !entry.follows(&prev_hash) {
                warn!(
                    index = position,
                    sequence = entry.sequence,
                    "Audit chain link broken"
                );
                return Ok(Some(position));
            }
            prev_hash = entry.entry_hash;
        }

        Ok(None)
    }

    /// Like [`verify_chain`](Self::verify_chain), but a break is an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first broken entry, or a
    /// storage error.
    pub async fn ensure_intact(&self) -> AuditResult<()> {
        match self.verify_chain().await? {
            Some(index) => Err(AuditError::ChainBroken { index }),
            None => Ok(()),
        }
    }

    /// All entries in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if entries cannot be read from storage.
    pub async fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        self.storage.all().await
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn len(&self) -> AuditResult<usize> {
        self.storage.count().await
    }

    /// Whether no entry has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn is_empty(&self) -> AuditResult<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditChain")
            .field("default_source", &self.default_source)
            .finish_non_exhaustive()
    }
}
