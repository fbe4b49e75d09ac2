//! Boundaries to the services that feed the integrity core.
//!
//! Fetching posts from a platform and classifying their text are external
//! concerns. The core only consumes what these traits return.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classification::Classification;
use crate::error::EvidenceResult;
use crate::input::{EvidenceInput, EvidenceInputV1};

/// The fields an artifact-fetch collaborator returns for one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedArtifact {
    /// Post text.
    pub content: String,
    /// Author handle.
    pub author_handle: String,
    /// Platform post identifier.
    pub post_id: String,
    /// ISO-8601 creation time as reported by the platform.
    pub timestamp: String,
    /// Attached media, in display order.
    #[serde(default)]
    pub media_urls: Vec<String>,
}

impl FetchedArtifact {
    /// Lift into the boundary type, attaching the investigator's claimed
    /// text when there is one.
    #[must_use]
    pub fn into_input(self, submitted_text: Option<String>) -> EvidenceInput {
        EvidenceInput::V1(EvidenceInputV1 {
            post_id: self.post_id,
            content: self.content,
            author_handle: self.author_handle,
            timestamp: self.timestamp,
            platform: "x".to_string(),
            media_urls: self.media_urls,
            engagement_metrics: serde_json::Value::Null,
            submitted_text,
        })
    }
}

/// Retrieves a post from its source platform.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the post identified by `locator` (a URL or platform id).
    async fn fetch(&self, locator: &str) -> EvidenceResult<FetchedArtifact>;
}

/// Assigns a category and confidence to post text.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `content`. Implementations must return a confidence in `[0, 1]`.
    async fn classify(&self, content: &str) -> EvidenceResult<Classification>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvidenceError;

    struct FixedFetcher;

    #[async_trait]
    impl ArtifactFetcher for FixedFetcher {
        async fn fetch(&self, locator: &str) -> EvidenceResult<FetchedArtifact> {
            if locator.is_empty() {
                return Err(EvidenceError::NotFound("empty locator".into()));
            }
            Ok(FetchedArtifact {
                content: "Suspect claims X".into(),
                author_handle: "user1".into(),
                post_id: locator.into(),
                timestamp: "2024-01-01T00:00:00".into(),
                media_urls: Vec::new(),
            })
        }
    }

    struct KeywordClassifier;

    #[async_trait]
    impl Classifier for KeywordClassifier {
        async fn classify(&self, content: &str) -> EvidenceResult<Classification> {
            if content.to_lowercase().contains("claims") {
                Classification::new("misinformation", 0.75)
            } else {
                Classification::new("benign", 0.5)
            }
        }
    }

    #[tokio::test]
    async fn test_fetched_artifact_becomes_valid_input() {
        let fetched = FixedFetcher.fetch("100").await.unwrap();
        let artifact = fetched
            .into_input(Some("suspect claims x".into()))
            .validate()
            .unwrap();
        assert_eq!(artifact.post_id.as_str(), "100");
        assert_eq!(artifact.matches_submitted_text(), Some(true));
    }

    #[tokio::test]
    async fn test_collaborators_as_trait_objects() {
        let fetcher: Box<dyn ArtifactFetcher> = Box::new(FixedFetcher);
        assert!(fetcher.fetch("").await.is_err());

        let classifier: Box<dyn Classifier> = Box::new(KeywordClassifier);
        let result = classifier.classify("Suspect claims X").await.unwrap();
        assert_eq!(result.category, "misinformation");
    }
}
