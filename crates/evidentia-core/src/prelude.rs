//! Prelude module - commonly used types for convenient import.
//!
//! Use `use evidentia_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{EvidenceError, EvidenceResult};

// Identifiers and time
pub use crate::{ActorId, CaptureTimestamp, PostId, RecordId, Timestamp};

// Boundary input
pub use crate::{CapturedArtifact, EvidenceInput, EvidenceInputV1};

// Classification
pub use crate::{CONFIDENCE_SCALE, Classification, ConfidenceScaled};

// Ledger linkage
pub use crate::{LedgerPointer, VerifiedFlag};

// Collaborators
pub use crate::{ArtifactFetcher, Classifier, FetchedArtifact};
