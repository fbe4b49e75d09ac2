//! Evidentia Core - Foundation types for the evidence integrity core.
//!
//! This crate provides:
//! - Identifier newtypes (actors, mirror records, posts)
//! - The versioned [`EvidenceInput`] boundary type and its validated form
//! - Classification output with fixed-point confidence
//! - Ledger pointers and the tri-state verification flag
//! - Collaborator traits consumed by the core (fetch, classification)
//! - The shared [`EvidenceError`] taxonomy
//!
//! Nothing in here talks to the network, the disk, or a cipher. Those
//! concerns live in `evidentia-ledger`, `evidentia-storage` and
//! `evidentia-crypto` respectively.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod classification;
pub mod collaborator;
pub mod error;
pub mod input;
pub mod types;

pub use classification::{CONFIDENCE_SCALE, Classification, ConfidenceScaled};
pub use collaborator::{ArtifactFetcher, Classifier, FetchedArtifact};
pub use error::{EvidenceError, EvidenceResult};
pub use input::{CapturedArtifact, EvidenceInput, EvidenceInputV1};
pub use types::{
    ActorId, CaptureTimestamp, LedgerPointer, PostId, RecordId, Timestamp, VerifiedFlag,
};
