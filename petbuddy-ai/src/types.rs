//! Recognition request/result types

use crate::taxonomy::Species;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One recognition invocation
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Raw encoded image bytes (shared, never copied per attempt)
    pub image: Arc<[u8]>,
    /// Only accept results of this species
    pub species_filter: Option<Species>,
}

impl RecognitionRequest {
    pub fn new(image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            image: image.into(),
            species_filter: None,
        }
    }

    pub fn with_species_filter(mut self, species: Species) -> Self {
        self.species_filter = Some(species);
        self
    }
}

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionErrorKind {
    ImageUnreadable,
    ImageTooLarge,
    ModelUnavailable,
    InferenceFailed,
    Uncertain,
    SpeciesMismatch,
}

impl RecognitionErrorKind {
    /// User-facing message
    pub fn message(&self) -> &'static str {
        match self {
            RecognitionErrorKind::ImageUnreadable => "image unreadable",
            RecognitionErrorKind::ImageTooLarge => "image too large",
            RecognitionErrorKind::ModelUnavailable => "model unavailable",
            RecognitionErrorKind::InferenceFailed => "recognition failed",
            RecognitionErrorKind::Uncertain => "recognition uncertain",
            RecognitionErrorKind::SpeciesMismatch => "species mismatch",
        }
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of one recognition attempt
///
/// `species`/`breed` are populated only when `success` is true; `error` and
/// `error_kind` only when it is false. `suggested_*` carry the model's best
/// guess for uncertain or mismatched predictions, as a manual-entry hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub success: bool,
    pub species: Option<Species>,
    pub breed: Option<String>,
    /// Top-label probability (0.0-1.0); 0.0 when no prediction was made
    pub confidence: f32,
    pub error: Option<String>,
    pub error_kind: Option<RecognitionErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_species: Option<Species>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_breed: Option<String>,
}

impl RecognitionResult {
    pub fn recognized(species: Species, breed: impl Into<String>, confidence: f32) -> Self {
        Self {
            success: true,
            species: Some(species),
            breed: Some(breed.into()),
            confidence,
            error: None,
            error_kind: None,
            suggested_species: None,
            suggested_breed: None,
        }
    }

    /// Failure before any prediction was made
    pub fn failed(kind: RecognitionErrorKind) -> Self {
        Self {
            success: false,
            species: None,
            breed: None,
            confidence: 0.0,
            error: Some(kind.message().to_string()),
            error_kind: Some(kind),
            suggested_species: None,
            suggested_breed: None,
        }
    }

    /// Failure that still has a best guess attached
    pub fn rejected(
        kind: RecognitionErrorKind,
        suggested_species: Species,
        suggested_breed: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            confidence,
            suggested_species: Some(suggested_species),
            suggested_breed: Some(suggested_breed.into()),
            ..Self::failed(kind)
        }
    }

    /// Confidence as a whole percentage, rounded
    pub fn confidence_percent(&self) -> u32 {
        confidence_percent(self.confidence)
    }
}

/// `0.83` → `83`; out-of-range and NaN clamp into 0-100
pub fn confidence_percent(confidence: f32) -> u32 {
    if confidence.is_nan() {
        return 0;
    }
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u32
}
