//! Classification output and its fixed-point ledger encoding.
//!
//! The classification collaborator produces a category and a confidence in
//! `[0, 1]`. The ledger has no float type, so confidence is anchored as an
//! integer scaled by [`CONFIDENCE_SCALE`] using round-half-up.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EvidenceError, EvidenceResult};

/// Fixed-point scale applied to confidence before anchoring.
pub const CONFIDENCE_SCALE: u64 = 10_000;

/// A category with the classifier's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Category label, e.g. `"harassment"`.
    pub category: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Classification {
    /// Create a classification, validating the confidence range.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] for a blank category or a
    /// confidence that is not a finite value in `[0, 1]`.
    pub fn new(category: impl Into<String>, confidence: f64) -> EvidenceResult<Self> {
        let classification = Self {
            category: category.into(),
            confidence,
        };
        classification.validate()?;
        Ok(classification)
    }

    /// Check the invariants a deserialized value may not satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] on a blank category or an
    /// out-of-range confidence.
    pub fn validate(&self) -> EvidenceResult<()> {
        if self.category.trim().is_empty() {
            return Err(EvidenceError::Validation(
                "classification category must not be empty".into(),
            ));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(EvidenceError::Validation(format!(
                "confidence {} must be a finite value in [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Confidence converted to the ledger's fixed-point representation.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] if the confidence is out of range.
    pub fn scaled_confidence(&self) -> EvidenceResult<ConfidenceScaled> {
        ConfidenceScaled::from_confidence(self.confidence)
    }
}

/// Confidence as a fixed-point integer in `[0, CONFIDENCE_SCALE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScaled(u64);

impl ConfidenceScaled {
    /// Scale a float confidence with round-half-up: `floor(c * 10000 + 0.5)`.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Validation`] for non-finite values or values
    /// outside `[0, 1]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::arithmetic_side_effects
    )]
    pub fn from_confidence(confidence: f64) -> EvidenceResult<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(EvidenceError::Validation(format!(
                "confidence {confidence} must be a finite value in [0, 1]"
            )));
        }
        // Range-checked above: the product lies in [0.5, 10000.5].
        let scaled = (confidence * CONFIDENCE_SCALE as f64 + 0.5).floor() as u64;
        Ok(Self(scaled.min(CONFIDENCE_SCALE)))
    }

    /// Wrap a raw fixed-point value read back from the ledger.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw fixed-point value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Convert back to a float, for display only.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / CONFIDENCE_SCALE as f64
    }
}

impl fmt::Display for ConfidenceScaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_rounds_half_up() {
        assert_eq!(ConfidenceScaled::from_confidence(0.0).unwrap().raw(), 0);
        assert_eq!(ConfidenceScaled::from_confidence(1.0).unwrap().raw(), 10_000);
        assert_eq!(ConfidenceScaled::from_confidence(0.87654).unwrap().raw(), 8765);
        // 1/32 and 31/32 scale to exact halves.
        assert_eq!(ConfidenceScaled::from_confidence(0.03125).unwrap().raw(), 313);
        assert_eq!(ConfidenceScaled::from_confidence(0.96875).unwrap().raw(), 9688);
        assert_eq!(ConfidenceScaled::from_confidence(0.5).unwrap().raw(), 5000);
    }

    #[test]
    fn test_scaling_rejects_out_of_range() {
        assert!(ConfidenceScaled::from_confidence(-0.01).is_err());
        assert!(ConfidenceScaled::from_confidence(1.01).is_err());
        assert!(ConfidenceScaled::from_confidence(f64::NAN).is_err());
        assert!(ConfidenceScaled::from_confidence(f64::INFINITY).is_err());
    }

    #[test]
    fn test_classification_validation() {
        assert!(Classification::new("threat", 0.9).is_ok());
        assert!(Classification::new("", 0.9).is_err());
        assert!(Classification::new("threat", 2.0).is_err());
    }

    #[test]
    fn test_display_four_places() {
        let scaled = ConfidenceScaled::from_raw(8765);
        assert_eq!(scaled.to_string(), "0.8765");
    }
}
