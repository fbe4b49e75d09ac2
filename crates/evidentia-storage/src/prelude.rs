//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_storage::prelude::*;` to import all essential types.

// Errors
pub use crate::{StorageError, StorageResult};

// Stores
pub use crate::{KvEntry, KvStore, MemoryKvStore, ScopedKvStore, SqliteKvStore};
