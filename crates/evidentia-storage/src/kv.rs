//! Namespaced byte store used by the mirror and the audit chain.
//!
//! Two namespaces exist in practice: `mirror` holds encrypted evidence rows
//! and `audit` holds chained log entries. Both are append-mostly and keyed by
//! [`sequence_key`], so ascending key order is insertion order. Rows are
//! never removed, which is why [`KvStore`] has no delete.
//!
//! Callers normally go through [`ScopedKvStore`], which fixes the namespace
//! and adds serde_json helpers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};

/// Reserved as the namespace/key separator by [`MemoryKvStore`].
const SEPARATOR: char = '\0';

fn check_segment(what: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        Err(StorageError::InvalidKey(format!("{what} is empty")))
    } else if value.contains(SEPARATOR) {
        Err(StorageError::InvalidKey(format!(
            "{what} {value:?} contains a NUL byte"
        )))
    } else {
        Ok(())
    }
}

pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    check_segment("namespace", namespace)
}

pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    check_segment("key", key)
}

/// Zero-padded decimal key, so lexicographic order matches numeric order.
#[must_use]
pub fn sequence_key(seq: u64) -> String {
    format!("{seq:020}")
}

/// Key and raw value of a stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Key inside its namespace.
    pub key: String,
    /// Stored bytes.
    pub value: Vec<u8>,
}

/// Byte-level storage partitioned by namespace.
///
/// Each `set` replaces the whole value at once; readers never observe a
/// partially written row.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value stored at `key`, or `None`.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` at `key`, replacing what was there.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Whether `key` holds a value.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Every key in the namespace, ascending.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Row with the greatest key in the namespace.
    async fn last_entry(&self, namespace: &str) -> StorageResult<Option<KvEntry>>;

    /// Hand out the namespace's next id. Starts at 1 and never repeats,
    /// even under concurrent callers.
    async fn next_sequence(&self, namespace: &str) -> StorageResult<u64>;

    /// Replace the value at `key` only if it still equals `current`
    /// (`None`: only if the key is absent). Returns whether the write
    /// happened. Holds across every handle on the same backing store.
    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        current: Option<&[u8]>,
        new: Vec<u8>,
    ) -> StorageResult<bool>;

    /// Read the namespace's last row, allocate the next sequence and store
    /// `build(last, seq)` under [`sequence_key`]`(seq)`, as one atomic unit
    /// across every handle on the same backing store. Nothing is written if
    /// `build` fails. Backends may run `build` on a blocking thread.
    async fn append_chained(&self, namespace: &str, build: ChainBuilder) -> StorageResult<KvEntry>;
}

/// Produces the value of an appended row from the namespace's last row
/// (if any) and the sequence allocated for the new one.
pub type ChainBuilder =
    Arc<dyn for<'e> Fn(Option<&'e KvEntry>, u64) -> StorageResult<Vec<u8>> + Send + Sync>;

/// [`KvStore`] held entirely in process memory.
///
/// Rows live in one ordered map under `"{namespace}\0{key}"`; a namespace
/// scan is the half-open range from `"{namespace}\0"` to `"{namespace}\x01"`.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    rows: RwLock<BTreeMap<String, Vec<u8>>>,
    counters: Mutex<HashMap<String, u64>>,
}

fn poisoned(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(format!("memory store lock poisoned: {e}"))
}

impl MemoryKvStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.rows.read().map_err(poisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.rows.write().map_err(poisoned)
    }

    fn counters(&self) -> StorageResult<MutexGuard<'_, HashMap<String, u64>>> {
        self.counters.lock().map_err(poisoned)
    }

    fn row_key(namespace: &str, key: &str) -> StorageResult<String> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        Ok(format!("{namespace}{SEPARATOR}{key}"))
    }

    /// Collect `(key, value)` pairs of a namespace through `pick`.
    fn scan<T>(
        &self,
        namespace: &str,
        pick: impl FnOnce(&mut dyn DoubleEndedIterator<Item = (&str, &Vec<u8>)>) -> T,
    ) -> StorageResult<T> {
        validate_namespace(namespace)?;
        let rows = self.read()?;
        let prefix = format!("{namespace}{SEPARATOR}");
        let upper = format!("{namespace}\u{1}");
        let mut iter = rows
            .range(prefix.clone()..upper)
            .filter_map(|(k, v)| k.strip_prefix(prefix.as_str()).map(|key| (key, v)));
        Ok(pick(&mut iter))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let row_key = Self::row_key(namespace, key)?;
        Ok(self.read()?.get(&row_key).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let row_key = Self::row_key(namespace, key)?;
        self.write()?.insert(row_key, value);
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let row_key = Self::row_key(namespace, key)?;
        Ok(self.read()?.contains_key(&row_key))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.scan(namespace, |rows| rows.map(|(k, _)| k.to_owned()).collect())
    }

    async fn last_entry(&self, namespace: &str) -> StorageResult<Option<KvEntry>> {
        self.scan(namespace, |rows| {
            rows.next_back().map(|(key, value)| KvEntry {
                key: key.to_owned(),
                value: value.clone(),
            })
        })
    }

    async fn next_sequence(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let mut counters = self.counters()?;
        let slot = counters.entry(namespace.to_owned()).or_default();
        let next = slot.checked_add(1).ok_or_else(|| {
            StorageError::Internal(format!("sequence for '{namespace}' exhausted"))
        })?;
        *slot = next;
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        current: Option<&[u8]>,
        new: Vec<u8>,
    ) -> StorageResult<bool> {
        let row_key = Self::row_key(namespace, key)?;
        let mut rows = self.write()?;
        if rows.get(&row_key).map(Vec::as_slice) != current {
            return Ok(false);
        }
        rows.insert(row_key, new);
        Ok(true)
    }

    async fn append_chained(&self, namespace: &str, build: ChainBuilder) -> StorageResult<KvEntry> {
        validate_namespace(namespace)?;
        // Row lock first, then the counter: the only place both are held.
        let mut rows = self.write()?;
        let prefix = format!("{namespace}{SEPARATOR}");
        let last = rows
            .range(prefix.clone()..format!("{namespace}\u{1}"))
            .next_back()
            .and_then(|(k, v)| {
                k.strip_prefix(prefix.as_str()).map(|key| KvEntry {
                    key: key.to_owned(),
                    value: v.clone(),
                })
            });

        let mut counters = self.counters()?;
        let slot = counters.entry(namespace.to_owned()).or_default();
        let seq = slot.checked_add(1).ok_or_else(|| {
            StorageError::Internal(format!("sequence for '{namespace}' exhausted"))
        })?;
        let value = build(last.as_ref(), seq)?;
        *slot = seq;

        let key = sequence_key(seq);
        rows.insert(format!("{prefix}{key}"), value.clone());
        Ok(KvEntry { key, value })
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A [`KvStore`] with its namespace fixed, plus JSON accessors.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Bind `store` to `namespace`.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidKey`] for an empty namespace or one holding a
    /// NUL byte.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// Bind to one of the crate's constant namespaces.
    #[must_use]
    pub fn from_static(store: Arc<dyn KvStore>, namespace: &'static str) -> Self {
        debug_assert!(validate_namespace(namespace).is_ok());
        Self {
            inner: store,
            namespace: namespace.to_owned(),
        }
    }

    /// # Errors
    ///
    /// Invalid key, or a backend failure.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.namespace, key).await
    }

    /// # Errors
    ///
    /// Invalid key, or a backend failure.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.set(&self.namespace, key, value).await
    }

    /// # Errors
    ///
    /// Invalid key, or a backend failure.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(&self.namespace, key).await
    }

    /// # Errors
    ///
    /// Backend failure.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// # Errors
    ///
    /// Backend failure or an exhausted counter.
    pub async fn next_sequence(&self) -> StorageResult<u64> {
        self.inner.next_sequence(&self.namespace).await
    }

    /// See [`KvStore::compare_and_swap`].
    ///
    /// # Errors
    ///
    /// Invalid key, or a backend failure.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        current: Option<&[u8]>,
        new: Vec<u8>,
    ) -> StorageResult<bool> {
        self.inner
            .compare_and_swap(&self.namespace, key, current, new)
            .await
    }

    /// Append `build(last, seq)` as the namespace's next row, atomically.
    /// See [`KvStore::append_chained`].
    ///
    /// # Errors
    ///
    /// Whatever `build` returns, or a backend failure.
    pub async fn append_chained(&self, build: ChainBuilder) -> StorageResult<KvEntry> {
        self.inner.append_chained(&self.namespace, build).await
    }

    /// Read and decode the row at `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] when the stored bytes are not valid
    /// JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] when `value` cannot be encoded.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes).await
    }

    /// Decode the row with the greatest key.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] on an undecodable row.
    pub async fn last_json<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        match self.inner.last_entry(&self.namespace).await? {
            Some(entry) => decode(&entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every row, ascending by key.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] on the first undecodable row.
    pub async fn values_json<T: DeserializeOwned>(&self) -> StorageResult<Vec<T>> {
        let mut out = Vec::new();
        for key in self.list_keys().await? {
            if let Some(bytes) = self.get(&key).await? {
                out.push(decode(&bytes)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip_and_overwrite() {
        let store = MemoryKvStore::new();
        assert!(store.get("mirror", "r1").await.unwrap().is_none());
        store.set("mirror", "r1", b"sealed-a".to_vec()).await.unwrap();
        store.set("mirror", "r1", b"sealed-b".to_vec()).await.unwrap();
        assert_eq!(
            store.get("mirror", "r1").await.unwrap(),
            Some(b"sealed-b".to_vec())
        );
    }

    #[tokio::test]
    async fn test_memory_namespaces_do_not_leak() {
        let store = MemoryKvStore::new();
        store.set("mirror", "k", b"m".to_vec()).await.unwrap();
        store.set("audit", "k", b"a".to_vec()).await.unwrap();
        store.set("mirror2", "x", b"z".to_vec()).await.unwrap();

        assert_eq!(store.get("audit", "k").await.unwrap(), Some(b"a".to_vec()));
        assert!(store.exists("mirror", "k").await.unwrap());
        assert!(!store.exists("ledger", "k").await.unwrap());
        assert_eq!(store.list_keys("mirror").await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn test_memory_keys_come_back_sorted() {
        let store = MemoryKvStore::new();
        for seq in [12, 3, 7] {
            store.set("audit", &sequence_key(seq), vec![]).await.unwrap();
        }
        assert_eq!(
            store.list_keys("audit").await.unwrap(),
            vec![sequence_key(3), sequence_key(7), sequence_key(12)]
        );
    }

    #[tokio::test]
    async fn test_memory_last_entry_ignores_prefix_neighbours() {
        let store = MemoryKvStore::new();
        assert!(store.last_entry("audit").await.unwrap().is_none());

        store.set("audit", &sequence_key(2), b"two".to_vec()).await.unwrap();
        store.set("audit", &sequence_key(10), b"ten".to_vec()).await.unwrap();
        store.set("auditx", "zzz", b"other".to_vec()).await.unwrap();

        let last = store.last_entry("audit").await.unwrap().unwrap();
        assert_eq!(last.key, sequence_key(10));
        assert_eq!(last.value, b"ten".to_vec());
    }

    #[tokio::test]
    async fn test_memory_sequence_counters_are_independent() {
        let store = MemoryKvStore::new();
        assert_eq!(store.next_sequence("mirror").await.unwrap(), 1);
        assert_eq!(store.next_sequence("mirror").await.unwrap(), 2);
        assert_eq!(store.next_sequence("audit").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_concurrent_sequences_are_unique() {
        let store = Arc::new(MemoryKvStore::new());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.next_sequence("mirror").await.unwrap() })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=32).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_memory_compare_and_swap() {
        let store = MemoryKvStore::new();
        assert!(store.compare_and_swap("mirror", "r1", None, b"a".to_vec()).await.unwrap());
        assert!(!store.compare_and_swap("mirror", "r1", None, b"x".to_vec()).await.unwrap());
        assert!(!store
            .compare_and_swap("mirror", "r1", Some(b"stale".as_slice()), b"x".to_vec())
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("mirror", "r1", Some(b"a".as_slice()), b"b".to_vec())
            .await
            .unwrap());
        assert_eq!(store.get("mirror", "r1").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_append_chained_links_to_last_row() {
        let store = MemoryKvStore::new();
        let link: ChainBuilder =
            Arc::new(|last: Option<&KvEntry>, seq: u64| -> StorageResult<Vec<u8>> {
                let prev = last.map_or_else(|| b"genesis".to_vec(), |e| e.value.clone());
                Ok([prev, format!("+{seq}").into_bytes()].concat())
            });

        let first = store.append_chained("audit", Arc::clone(&link)).await.unwrap();
        let second = store.append_chained("audit", Arc::clone(&link)).await.unwrap();
        assert_eq!(first.key, sequence_key(1));
        assert_eq!(second.value, b"genesis+1+2".to_vec());

        let failing: ChainBuilder =
            Arc::new(|_: Option<&KvEntry>, _: u64| -> StorageResult<Vec<u8>> {
                Err(StorageError::Serialization("nope".into()))
            });
        assert!(store.append_chained("audit", failing).await.is_err());
        assert_eq!(store.list_keys("audit").await.unwrap().len(), 2);
        let third = store.append_chained("audit", link).await.unwrap();
        assert_eq!(third.key, sequence_key(3));
    }

    #[test]
    fn test_segment_validation() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("mi\0rror").is_err());
        assert!(validate_namespace("mirror").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("0\0").is_err());
    }

    #[test]
    fn test_sequence_key_is_fixed_width() {
        assert!(sequence_key(99) < sequence_key(100));
        assert_eq!(sequence_key(u64::MAX).len(), 20);
    }

    #[tokio::test]
    async fn test_scoped_json_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Row {
            id: u64,
            post_id: String,
        }

        let scoped = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "mirror").unwrap();
        assert!(scoped.last_json::<Row>().await.unwrap().is_none());

        for expected in 1..=3 {
            let id = scoped.next_sequence().await.unwrap();
            assert_eq!(id, expected);
            let row = Row {
                id,
                post_id: format!("post-{id}"),
            };
            scoped.set_json(&sequence_key(id), &row).await.unwrap();
        }

        let last: Row = scoped.last_json().await.unwrap().unwrap();
        assert_eq!(last.post_id, "post-3");
        let all: Vec<Row> = scoped.values_json().await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(scoped.get_json::<Row>("absent").await.unwrap().is_none());
        assert!(scoped.exists(&sequence_key(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_scoped_rejects_bad_names() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        assert!(ScopedKvStore::new(Arc::clone(&store), "").is_err());
        let scoped = ScopedKvStore::new(store, "mirror").unwrap();
        assert!(matches!(
            scoped.get("").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_scoped_get_json_rejects_garbage() {
        let scoped = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "mirror").unwrap();
        scoped.set("k", b"not json".to_vec()).await.unwrap();
        assert!(matches!(
            scoped.get_json::<u64>("k").await,
            Err(StorageError::Serialization(_))
        ));
    }
}
