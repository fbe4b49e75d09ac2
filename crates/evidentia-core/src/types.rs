//! Common types used throughout Evidentia.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EvidenceError, EvidenceResult};

/// Authenticated identity of the investigator or system actor making a call.
///
/// Supplied by the authentication collaborator. `ActorId::SYSTEM` (0) is
/// used for entries where no authenticated actor exists yet, such as a
/// failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Actor recorded when no authenticated user is involved.
    pub const SYSTEM: Self = Self(0);

    /// Create an actor ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auto-increment identifier of a local mirror record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record:{}", self.0)
    }
}

/// Identifier of the captured post on its source platform.
///
/// Kept as a string: platforms use numeric snowflakes that overflow
/// `u64` parsing on some inputs, and the canonical hash stringifies it
/// anyway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Create a post ID, rejecting empty or whitespace-only values.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] if `raw` is blank.
    pub fn new(raw: impl Into<String>) -> EvidenceResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(EvidenceError::Validation("post id must not be empty".into()));
        }
        Ok(Self(raw))
    }

    /// The post ID as captured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Timestamp wrapper for consistent handling throughout Evidentia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Render with microsecond precision, the form stored on audit entries.
    #[must_use]
    pub fn to_audit_string(&self) -> String {
        self.0
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Canonical ISO-8601 capture time of an artifact.
///
/// Inputs may arrive as RFC 3339 (`2024-01-01T00:00:00.000Z`, with offset)
/// or as naive local-less datetimes (`2024-01-01T00:00:00`). Both are
/// normalised to UTC and rendered as `%Y-%m-%dT%H:%M:%S%.f`, with the
/// fractional part omitted when it is zero. The canonical string is what
/// gets hashed and anchored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureTimestamp {
    canonical: String,
    instant: NaiveDateTime,
}

/// Rendering used for the canonical form.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl CaptureTimestamp {
    /// Parse and canonicalise a capture time.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] if the value is empty or not an
    /// ISO-8601 datetime.
    pub fn parse(raw: &str) -> EvidenceResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EvidenceError::Validation("timestamp must not be empty".into()));
        }

        let instant = if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            dt.with_timezone(&Utc).naive_utc()
        } else if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, CANONICAL_FORMAT) {
            naive
        } else if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
            naive
        } else {
            return Err(EvidenceError::Validation(format!(
                "timestamp '{trimmed}' is not ISO-8601"
            )));
        };

        Ok(Self {
            canonical: instant.format(CANONICAL_FORMAT).to_string(),
            instant,
        })
    }

    /// The canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The parsed instant (UTC).
    #[must_use]
    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for CaptureTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for CaptureTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Where a record landed on the ledger. Absent until anchoring succeeds,
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerPointer {
    /// Sequence index assigned by the ledger contract.
    pub index: u64,
    /// Canonical transaction identifier (`0x`-prefixed hex).
    pub tx_hash: String,
}

impl fmt::Display for LedgerPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.tx_hash)
    }
}

/// Tri-state outcome of the most recent verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifiedFlag {
    /// Never verified, or skipped because no ledger linkage exists.
    #[default]
    Unset,
    /// The latest check matched the ledger.
    Verified,
    /// The latest check found a mismatch.
    Tampered,
}

impl VerifiedFlag {
    /// Legacy boolean view: `None` for unset.
    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::Verified => Some(true),
            Self::Tampered => Some(false),
        }
    }
}

impl fmt::Display for VerifiedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Verified => write!(f, "verified"),
            Self::Tampered => write!(f, "tampered"),
        }
    }
}
