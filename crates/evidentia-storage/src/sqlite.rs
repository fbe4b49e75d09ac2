//! SQLite-backed [`KvStore`].

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::kv::{
    ChainBuilder, KvEntry, KvStore, sequence_key, validate_key, validate_namespace,
};

/// Applied to file databases only. WAL lets readers in other processes
/// proceed while one connection holds the write lock.
const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;";

/// How long a statement waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_LAST: &str =
    "SELECT key, value FROM kv WHERE namespace = ?1 ORDER BY key DESC LIMIT 1";
const BUMP_SEQUENCE: &str = "INSERT INTO sequences (namespace, value) VALUES (?1, 1)
     ON CONFLICT (namespace) DO UPDATE SET value = value + 1
     RETURNING value";
const UPSERT: &str = "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
     ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value";

fn last_row(conn: &Connection, namespace: &str) -> StorageResult<Option<KvEntry>> {
    Ok(conn
        .query_row(SELECT_LAST, params![namespace], |row| {
            Ok(KvEntry {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        })
        .optional()?)
}

fn bump_sequence(conn: &Connection, namespace: &str) -> StorageResult<u64> {
    let value: i64 = conn.query_row(BUMP_SEQUENCE, params![namespace], |row| row.get(0))?;
    u64::try_from(value).map_err(|e| StorageError::Internal(e.to_string()))
}

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS kv (
        namespace TEXT NOT NULL,
        key       TEXT NOT NULL,
        value     BLOB NOT NULL,
        PRIMARY KEY (namespace, key)
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS sequences (
        namespace TEXT PRIMARY KEY,
        value     INTEGER NOT NULL
    );
";

/// Persistent key-value store in a single SQLite database.
///
/// Every operation is one statement or one `BEGIN IMMEDIATE` transaction,
/// so it is atomic against other connections to the same file, including
/// other processes. Statements run on the blocking pool: waiting out
/// another process's write lock must not stall a runtime worker.
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKvStore").finish_non_exhaustive()
    }
}

impl SqliteKvStore {
    /// Open (or create) a database file. `":memory:"` opens a private
    /// in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let in_memory = path == Path::new(":memory:");
        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
            Connection::open(path).and_then(|conn| {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn.execute_batch(FILE_PRAGMAS)?;
                Ok(conn)
            })
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if `SQLite` cannot initialise.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open(":memory:")
    }

    /// Run `op` against the connection on a blocking thread.
    async fn with_conn<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let (namespace, key) = (namespace.to_owned(), key.to_owned());
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let (namespace, key) = (namespace.to_owned(), key.to_owned());
        self.with_conn(move |conn| {
            conn.execute(UPSERT, params![namespace, key, value])?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let (namespace, key) = (namespace.to_owned(), key.to_owned());
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM kv WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let namespace = namespace.to_owned();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY key ASC")?;
            let keys = stmt
                .query_map(params![namespace], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn last_entry(&self, namespace: &str) -> StorageResult<Option<KvEntry>> {
        validate_namespace(namespace)?;
        let namespace = namespace.to_owned();
        self.with_conn(move |conn| last_row(conn, &namespace)).await
    }

    async fn next_sequence(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let namespace = namespace.to_owned();
        self.with_conn(move |conn| bump_sequence(conn, &namespace)).await
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        current: Option<&[u8]>,
        new: Vec<u8>,
    ) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let (namespace, key) = (namespace.to_owned(), key.to_owned());
        let current = current.map(<[u8]>::to_vec);
        self.with_conn(move |conn| {
            let changed = match current {
                Some(current) => conn.execute(
                    "UPDATE kv SET value = ?4 WHERE namespace = ?1 AND key = ?2 AND value = ?3",
                    params![namespace, key, current, new],
                )?,
                None => conn.execute(
                    "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT (namespace, key) DO NOTHING",
                    params![namespace, key, new],
                )?,
            };
            Ok(changed == 1)
        })
        .await
    }

    async fn append_chained(&self, namespace: &str, build: ChainBuilder) -> StorageResult<KvEntry> {
        validate_namespace(namespace)?;
        let owned = namespace.to_owned();
        let entry = self
            .with_conn(move |conn| {
                // IMMEDIATE takes the write lock up front, so no other
                // connection can read the same last row before this one
                // commits.
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let last = last_row(&tx, &owned)?;
                let seq = bump_sequence(&tx, &owned)?;
                let value = build(last.as_ref(), seq)?;
                let key = sequence_key(seq);
                tx.execute(UPSERT, params![owned, key, value])?;
                tx.commit()?;
                Ok(KvEntry { key, value })
            })
            .await?;

        debug!(namespace, key = %entry.key, "Appended chained row");
        Ok(entry)
    }
}
