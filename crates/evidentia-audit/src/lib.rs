//! Evidentia Audit - Hash-linked, append-only action log.
//!
//! This crate provides:
//! - [`AuditEntry`]: one row, committing to the previous row's hash
//! - [`AuditChain`]: serialized appends and full-chain verification
//! - [`AuditStorage`]: persistence over any [`evidentia_storage::KvStore`]
//!
//! # Security Model
//!
//! Each entry's hash is
//! `SHA-256(prev_hash + actor + action + details + timestamp + source_address)`
//! with plain string concatenation. The first entry links to the
//! [`GENESIS_PREV_HASH`] sentinel. Editing any stored field of entry *i*
//! makes [`AuditChain::verify_chain`] report index *i*.
//!
//! The chain is independent of the ledger: it is tamper-evident, not
//! tamper-proof, and a break is reported, never repaired.
//!
//! # Example
//!
//! ```
//! use evidentia_audit::{AuditAction, AuditChain};
//! use evidentia_core::ActorId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> evidentia_audit::AuditResult<()> {
//! let chain = AuditChain::in_memory();
//! chain
//!     .append(ActorId::new(7), AuditAction::EvidenceCaptured, "record:1")
//!     .await?;
//! assert_eq!(chain.verify_chain().await?, None);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod chain;
mod entry;
mod error;
mod storage;

pub use chain::{AuditChain, DEFAULT_SOURCE_ADDRESS};
pub use entry::{AuditAction, AuditEntry, GENESIS_PREV_HASH};
pub use error::{AuditError, AuditResult};
pub use storage::{AUDIT_NAMESPACE, AuditStorage};
