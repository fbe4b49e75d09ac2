//! Evidentia Storage - Namespaced key-value persistence.
//!
//! The mirror records and the audit chain both live behind the [`KvStore`]
//! trait. Two backends are provided:
//!
//! - [`MemoryKvStore`]: ordered in-memory map for tests and ephemeral runs
//! - [`SqliteKvStore`]: a single SQLite file (or `:memory:`)
//!
//! Keys within a namespace are returned in byte order, so fixed-width
//! sequence keys (see [`sequence_key`]) iterate in insertion order.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
pub mod kv;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use kv::{ChainBuilder, KvEntry, KvStore, MemoryKvStore, ScopedKvStore, sequence_key};
pub use sqlite::SqliteKvStore;
