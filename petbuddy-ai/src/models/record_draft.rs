//! Pending animal record
//!
//! The draft is owned by the record-creation collaborator; recognition only
//! writes into it on an explicit accept. Persistence happens elsewhere.

use crate::taxonomy::Species;
use crate::types::confidence_percent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Report category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordCategory {
    /// Animal was found; recognition allowed
    Found,
    /// Owner's own animal is missing
    Missing,
}

/// In-progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub category: RecordCategory,

    /// Attached photo (encoded bytes)
    #[serde(skip)]
    pub photo: Option<Arc<[u8]>>,

    pub species: Option<Species>,
    pub breed: Option<String>,

    /// Free-text description
    pub description: String,
}

impl RecordDraft {
    pub fn new(category: RecordCategory) -> Self {
        Self {
            category,
            photo: None,
            species: None,
            breed: None,
            description: String::new(),
        }
    }

    pub fn with_photo(mut self, photo: impl Into<Arc<[u8]>>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Write an accepted recognition into the draft
    pub fn apply_recognition(&mut self, species: Species, breed: &str, confidence: f32) {
        self.species = Some(species);
        self.breed = Some(breed.to_string());

        let note = provenance_note(species, breed, confidence);
        if self.description.trim().is_empty() {
            self.description = note;
        } else {
            self.description = format!("{}\n\n{}", self.description.trim_end(), note);
        }
    }
}

/// `AI-suggested breed: golden_retriever (species: Dog, confidence 83%)`
pub fn provenance_note(species: Species, breed: &str, confidence: f32) -> String {
    format!(
        "AI-suggested breed: {} (species: {}, confidence {}%)",
        breed,
        species,
        confidence_percent(confidence)
    )
}
