//! Evidentia Evidence - Capture, anchoring and verification of evidence.
//!
//! [`EvidenceStore`] ties the pieces together:
//!
//! ```text
//! create ──► mirror row (encrypted) ──► anchor ──► ledger pointers
//!                                          │
//!                                          └─ timeout ──► pending ──► resume_anchor
//! verify ──► ledger copy ──► ReconciliationVerifier ──► verified / tampered
//! ```
//!
//! Every security-relevant step is appended to the [`AuditChain`]. A row
//! is anchored at most once: a submitter first claims the row in storage,
//! and a claim, an outstanding submission or stored pointers all block
//! another submit, across processes sharing the database.
//!
//! [`AuditChain`]: evidentia_audit::AuditChain

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod mirror;
mod store;
mod verify;

pub use mirror::{
    AnchorClaim, EvidenceView, LocalMirrorRecord, MIRROR_NAMESPACE, MirrorStore, PendingAnchor,
};
pub use store::{AnchorOutcome, EvidenceStore};
pub use verify::{ReconciliationVerifier, VerificationReport, VerificationStatus};
