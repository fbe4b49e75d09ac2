//! Test fixtures for common types.

use evidentia_core::{ActorId, Classification, EvidenceInput, EvidenceInputV1, FetchedArtifact};
use evidentia_crypto::FieldKey;
use serde_json::json;

/// Post text of the reference hashing vector.
pub const REFERENCE_CONTENT: &str = "Suspect claims X";
/// Author of the reference hashing vector.
pub const REFERENCE_AUTHOR: &str = "user1";
/// Post id of the reference hashing vector.
pub const REFERENCE_POST_ID: &str = "100";
/// Capture time of the reference hashing vector.
pub const REFERENCE_TIMESTAMP: &str = "2024-01-01T00:00:00";

/// Investigator used by fixtures.
pub const INVESTIGATOR: ActorId = ActorId::new(7);
/// A second, unrelated investigator.
pub const OTHER_INVESTIGATOR: ActorId = ActorId::new(8);

/// The reference artifact as version 1 input.
#[must_use]
pub fn sample_input() -> EvidenceInput {
    sample_input_for(REFERENCE_POST_ID, REFERENCE_CONTENT)
}

/// Version 1 input with a chosen post id and text.
#[must_use]
pub fn sample_input_for(post_id: &str, content: &str) -> EvidenceInput {
    EvidenceInput::V1(EvidenceInputV1 {
        post_id: post_id.to_string(),
        content: content.to_string(),
        author_handle: REFERENCE_AUTHOR.to_string(),
        timestamp: REFERENCE_TIMESTAMP.to_string(),
        platform: "x".to_string(),
        media_urls: vec!["https://media.example/1.jpg".to_string()],
        engagement_metrics: json!({ "likes": 12, "retweets": 3 }),
        submitted_text: None,
    })
}

/// The reference artifact as the fetch collaborator returns it.
#[must_use]
pub fn sample_fetched() -> FetchedArtifact {
    FetchedArtifact {
        content: REFERENCE_CONTENT.to_string(),
        author_handle: REFERENCE_AUTHOR.to_string(),
        post_id: REFERENCE_POST_ID.to_string(),
        timestamp: REFERENCE_TIMESTAMP.to_string(),
        media_urls: Vec::new(),
    }
}

/// A valid classifier output.
#[must_use]
pub fn sample_classification() -> Classification {
    Classification {
        category: "threat".to_string(),
        confidence: 0.875,
    }
}

/// A fresh random field key.
#[must_use]
pub fn test_key() -> FieldKey {
    FieldKey::generate()
}
