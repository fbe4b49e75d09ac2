//! The versioned boundary type for captured artifacts.
//!
//! Payloads are parsed exactly once, here. Everything past this module works
//! with a [`CapturedArtifact`], never with raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvidenceError, EvidenceResult};
use crate::types::{CaptureTimestamp, PostId};

/// Current wire version of [`EvidenceInput`].
pub const CURRENT_VERSION: u64 = 1;

/// Platform recorded when the payload does not name one.
const DEFAULT_PLATFORM: &str = "x";

/// Version 1 of the evidence payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceInputV1 {
    /// Identifier of the post on its platform.
    pub post_id: String,
    /// Post text as fetched.
    pub content: String,
    /// Handle of the post author.
    pub author_handle: String,
    /// ISO-8601 capture time.
    pub timestamp: String,
    /// Source platform.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Attached media, in display order.
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// Opaque engagement counters.
    #[serde(default)]
    pub engagement_metrics: Value,
    /// Text the investigator claims the post contains, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_text: Option<String>,
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

/// Raw post shape produced by the fetch collaborator before versioning.
#[derive(Debug, Deserialize)]
struct LegacyPost {
    id: Value,
    text: String,
    author_username: String,
    created_at: String,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    public_metrics: Value,
}

impl From<LegacyPost> for EvidenceInputV1 {
    fn from(post: LegacyPost) -> Self {
        let post_id = match post.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            post_id,
            content: post.text,
            author_handle: post.author_username,
            timestamp: post.created_at,
            platform: default_platform(),
            media_urls: post.media_urls,
            engagement_metrics: post.public_metrics,
            submitted_text: None,
        }
    }
}

/// A captured artifact as it arrives at the system boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceInput {
    /// `"version": 1`.
    V1(EvidenceInputV1),
}

impl EvidenceInput {
    /// Parse a JSON payload.
    ///
    /// Accepts versioned payloads and the legacy unversioned post shape
    /// (`id`, `text`, `author_username`, `created_at`), which is lifted
    /// into V1.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] for malformed JSON, an unknown
    /// version, or a shape that matches neither form.
    pub fn from_json(raw: &str) -> EvidenceResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| EvidenceError::Validation(format!("invalid evidence json: {e}")))?;
        Self::from_value(value)
    }

    /// Parse an already-decoded JSON value. See [`EvidenceInput::from_json`].
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] when the value is not a
    /// recognised payload.
    pub fn from_value(mut value: Value) -> EvidenceResult<Self> {
        let Some(object) = value.as_object_mut() else {
            return Err(EvidenceError::Validation(
                "evidence payload must be a JSON object".into(),
            ));
        };

        match object.remove("version") {
            Some(Value::Number(n)) if n.as_u64() == Some(CURRENT_VERSION) => {
                let v1: EvidenceInputV1 = serde_json::from_value(value).map_err(|e| {
                    EvidenceError::Validation(format!("invalid v1 evidence payload: {e}"))
                })?;
                Ok(Self::V1(v1))
            },
            Some(other) => Err(EvidenceError::Validation(format!(
                "unsupported evidence payload version: {other}"
            ))),
            None => {
                let legacy: LegacyPost = serde_json::from_value(value).map_err(|e| {
                    EvidenceError::Validation(format!(
                        "unversioned payload is not a recognised post: {e}"
                    ))
                })?;
                Ok(Self::V1(legacy.into()))
            },
        }
    }

    /// Validate and normalise into the form the core works with.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] if any hashed field is blank,
    /// the timestamp is not ISO-8601, or a media URL is blank.
    pub fn validate(self) -> EvidenceResult<CapturedArtifact> {
        match self {
            Self::V1(v1) => v1.validate(),
        }
    }
}

impl EvidenceInputV1 {
    fn validate(self) -> EvidenceResult<CapturedArtifact> {
        if self.content.is_empty() {
            return Err(EvidenceError::Validation("content must not be empty".into()));
        }
        if self.author_handle.is_empty() {
            return Err(EvidenceError::Validation(
                "author handle must not be empty".into(),
            ));
        }
        if self.media_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(EvidenceError::Validation(
                "media urls must not contain blank entries".into(),
            ));
        }

        Ok(CapturedArtifact {
            post_id: PostId::new(self.post_id)?,
            content: self.content,
            author_handle: self.author_handle,
            timestamp: CaptureTimestamp::parse(&self.timestamp)?,
            platform: self.platform,
            media_urls: self.media_urls,
            engagement_metrics: self.engagement_metrics,
            submitted_text: self.submitted_text,
        })
    }
}

impl From<EvidenceInputV1> for EvidenceInput {
    fn from(v1: EvidenceInputV1) -> Self {
        Self::V1(v1)
    }
}

#[derive(Serialize)]
struct Versioned<'a> {
    version: u64,
    #[serde(flatten)]
    body: &'a EvidenceInputV1,
}

impl Serialize for EvidenceInput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::V1(body) => Versioned {
                version: CURRENT_VERSION,
                body,
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EvidenceInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// A validated artifact with a canonical timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    /// Identifier of the post on its platform.
    pub post_id: PostId,
    /// Post text, exactly as fetched.
    pub content: String,
    /// Handle of the post author.
    pub author_handle: String,
    /// Canonical capture time.
    pub timestamp: CaptureTimestamp,
    /// Source platform.
    pub platform: String,
    /// Attached media, in display order. May be empty.
    pub media_urls: Vec<String>,
    /// Opaque engagement counters.
    pub engagement_metrics: Value,
    /// Investigator-supplied text, if any.
    pub submitted_text: Option<String>,
}

impl CapturedArtifact {
    /// Compare the investigator-supplied text with the fetched content.
    ///
    /// Returns `None` when no text was submitted. The comparison ignores
    /// case, leading/trailing whitespace and whitespace runs.
    #[must_use]
    pub fn matches_submitted_text(&self) -> Option<bool> {
        self.submitted_text
            .as_deref()
            .map(|submitted| normalize_text(submitted) == normalize_text(&self.content))
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = r#"{
        "version": 1,
        "post_id": "100",
        "content": "Suspect claims X",
        "author_handle": "user1",
        "timestamp": "2024-01-01T00:00:00Z",
        "media_urls": ["https://img.example/a.png"],
        "engagement_metrics": {"like_count": 3}
    }"#;

    #[test]
    fn test_parse_v1() {
        let input = EvidenceInput::from_json(V1).unwrap();
        let artifact = input.validate().unwrap();
        assert_eq!(artifact.post_id.as_str(), "100");
        assert_eq!(artifact.timestamp.as_str(), "2024-01-01T00:00:00");
        assert_eq!(artifact.platform, "x");
        assert_eq!(artifact.media_urls.len(), 1);
        assert_eq!(artifact.engagement_metrics["like_count"], 3);
    }

    #[test]
    fn test_parse_legacy_post_shape() {
        let raw = r#"{
            "id": 1234567890123456789,
            "text": "hello world",
            "author_username": "alice",
            "created_at": "2024-02-02T12:00:00.000Z",
            "public_metrics": {"retweet_count": 1}
        }"#;
        let EvidenceInput::V1(v1) = EvidenceInput::from_json(raw).unwrap();
        assert_eq!(v1.post_id, "1234567890123456789");
        assert_eq!(v1.content, "hello world");
        assert!(v1.media_urls.is_empty());

        let artifact = EvidenceInput::V1(v1).validate().unwrap();
        assert_eq!(artifact.timestamp.as_str(), "2024-02-02T12:00:00");
    }

    #[test]
    fn test_unknown_version_rejected() {
        let raw = r#"{"version": 9, "post_id": "1"}"#;
        assert!(matches!(
            EvidenceInput::from_json(raw),
            Err(EvidenceError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_fields_rejected_in_v1() {
        let raw = V1.replace("\"version\": 1,", "\"version\": 1, \"surprise\": true,");
        assert!(EvidenceInput::from_json(&raw).is_err());
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut v1 = match EvidenceInput::from_json(V1).unwrap() {
            EvidenceInput::V1(v1) => v1,
        };
        v1.author_handle = String::new();
        assert!(EvidenceInput::V1(v1).validate().is_err());
    }

    #[test]
    fn test_serialize_carries_version() {
        let input = EvidenceInput::from_json(V1).unwrap();
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["version"], 1);
        let back: EvidenceInput = serde_json::from_value(value).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn test_submitted_text_cross_check() {
        let mut artifact = EvidenceInput::from_json(V1).unwrap().validate().unwrap();
        assert_eq!(artifact.matches_submitted_text(), None);

        artifact.submitted_text = Some("  suspect   CLAIMS x ".into());
        assert_eq!(artifact.matches_submitted_text(), Some(true));

        artifact.submitted_text = Some("suspect denies X".into());
        assert_eq!(artifact.matches_submitted_text(), Some(false));
    }
}
