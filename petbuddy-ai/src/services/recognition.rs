//! Recognition Service
//!
//! Public entry point: Preprocessor → Classifier → Confidence Gate → Taxonomy
//! → species filter. Every recoverable failure is folded into the returned
//! `RecognitionResult`; nothing here returns `Err`.
//!
//! Stateless per call apart from the shared model held by `ModelManager`.

use super::classifier::{self, RankedLabel};
use super::confidence_gate::{ConfidenceGate, GateOutcome};
use super::model_manager::ModelManager;
use super::preprocessor::{ImagePreprocessor, PreprocessError};
use crate::config::RecognitionConfig;
use crate::taxonomy::{CatalogTaxonomy, Species, SpeciesTaxonomy};
use crate::types::{RecognitionErrorKind, RecognitionRequest, RecognitionResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrates one recognition call end to end
#[derive(Clone)]
pub struct RecognitionService {
    preprocessor: ImagePreprocessor,
    models: Arc<ModelManager>,
    gate: ConfidenceGate,
    taxonomy: Arc<dyn SpeciesTaxonomy>,
}

impl RecognitionService {
    /// Build from configuration with the catalog taxonomy from `cat_breeds`
    pub fn new(config: &RecognitionConfig, models: Arc<ModelManager>) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config.limits),
            models,
            gate: ConfidenceGate::new(config.confidence_threshold),
            taxonomy: Arc::new(CatalogTaxonomy::new(&config.cat_breeds)),
        }
    }

    /// Swap the label → species mapping
    pub fn with_taxonomy(mut self, taxonomy: Arc<dyn SpeciesTaxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    pub fn threshold(&self) -> f32 {
        self.gate.threshold()
    }

    /// Load the model ahead of the first request
    pub async fn warm_up(&self) -> bool {
        self.models.get_model().await.is_ok()
    }

    /// Convenience wrapper over [`Self::recognize_pet`]
    pub async fn recognize_bytes(
        &self,
        image: impl Into<Arc<[u8]>>,
        species_filter: Option<Species>,
    ) -> RecognitionResult {
        self.recognize_pet(RecognitionRequest {
            image: image.into(),
            species_filter,
        })
        .await
    }

    /// Recognize species and breed from a photo
    pub async fn recognize_pet(&self, request: RecognitionRequest) -> RecognitionResult {
        let started = Instant::now();
        let result = self.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if result.success {
            info!(
                species = ?result.species,
                label = ?result.breed,
                confidence = result.confidence,
                elapsed_ms,
                "Pet recognized"
            );
        } else {
            warn!(
                error = ?result.error_kind,
                suggested = ?result.suggested_breed,
                confidence = result.confidence,
                elapsed_ms,
                "Pet recognition unsuccessful"
            );
        }
        result
    }

    async fn run(&self, request: RecognitionRequest) -> RecognitionResult {
        // Decode first: a bad upload never triggers a model load
        let preprocessor = self.preprocessor.clone();
        let bytes = Arc::clone(&request.image);
        let image = match tokio::task::spawn_blocking(move || preprocessor.decode_and_normalize(&bytes)).await {
            Ok(Ok(image)) => image,
            Ok(Err(PreprocessError::TooLarge(reason))) => {
                debug!(%reason, "Image rejected");
                return RecognitionResult::failed(RecognitionErrorKind::ImageTooLarge);
            }
            Ok(Err(PreprocessError::Decode(reason))) => {
                debug!(%reason, "Image rejected");
                return RecognitionResult::failed(RecognitionErrorKind::ImageUnreadable);
            }
            Err(e) => {
                warn!(error = %e, "Image decode task failed");
                return RecognitionResult::failed(RecognitionErrorKind::ImageUnreadable);
            }
        };

        let model = match self.models.get_model().await {
            Ok(model) => model,
            Err(e) => {
                debug!(error = %e, "No resident model");
                return RecognitionResult::failed(RecognitionErrorKind::ModelUnavailable);
            }
        };

        let ranked = match tokio::task::spawn_blocking(move || classifier::predict(&model, &image)).await {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => {
                warn!(error = %e, "Inference failed");
                return RecognitionResult::failed(RecognitionErrorKind::InferenceFailed);
            }
            Err(e) => {
                warn!(error = %e, "Inference task failed");
                return RecognitionResult::failed(RecognitionErrorKind::InferenceFailed);
            }
        };

        self.decide(ranked, request.species_filter)
    }

    /// Gate, map to species, apply filter
    fn decide(&self, ranked: RankedLabel, species_filter: Option<Species>) -> RecognitionResult {
        match self.gate.gate(ranked) {
            GateOutcome::LowConfidence(ranked) => {
                let species = self.taxonomy.classify_species(&ranked.label);
                RecognitionResult::rejected(
                    RecognitionErrorKind::Uncertain,
                    species,
                    ranked.label,
                    ranked.probability,
                )
            }
            GateOutcome::Accepted(ranked) => {
                let species = self.taxonomy.classify_species(&ranked.label);
                match species_filter {
                    Some(expected) if expected != species => {
                        debug!(%expected, %species, label = %ranked.label, "Species filter rejected prediction");
                        RecognitionResult::rejected(
                            RecognitionErrorKind::SpeciesMismatch,
                            species,
                            ranked.label,
                            ranked.probability,
                        )
                    }
                    _ => RecognitionResult::recognized(species, ranked.label, ranked.probability),
                }
            }
        }
    }
}

impl std::fmt::Debug for RecognitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionService")
            .field("preprocessor", &self.preprocessor)
            .field("models", &self.models)
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model_manager::{LoadedModel, ModelLoadError, ModelLoader};

    struct NeverLoads;

    impl ModelLoader for NeverLoads {
        fn load(&self) -> Result<LoadedModel, ModelLoadError> {
            Err(ModelLoadError::Fetch("offline".to_string()))
        }
    }

    fn service(threshold: f32) -> RecognitionService {
        let config = RecognitionConfig {
            confidence_threshold: threshold,
            ..Default::default()
        };
        RecognitionService::new(&config, Arc::new(ModelManager::new(Arc::new(NeverLoads))))
    }

    fn ranked(label: &str, probability: f32) -> RankedLabel {
        RankedLabel {
            label: label.to_string(),
            probability,
        }
    }

    #[test]
    fn test_decide_accepts_dog() {
        let result = service(0.2).decide(ranked("golden_retriever", 0.83), None);
        assert_eq!(result, RecognitionResult::recognized(Species::Dog, "golden_retriever", 0.83));
    }

    #[test]
    fn test_decide_maps_catalog_label_to_cat() {
        let result = service(0.2).decide(ranked("persian", 0.91), None);
        assert_eq!(result.species, Some(Species::Cat));
    }

    #[test]
    fn test_decide_uncertain_carries_confidence_and_guess() {
        let result = service(0.2).decide(ranked("some_label", 0.05), None);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("recognition uncertain"));
        assert!((result.confidence - 0.05).abs() < f32::EPSILON);
        assert_eq!(result.suggested_species, Some(Species::Dog));
        assert!(result.species.is_none());
    }

    #[test]
    fn test_decide_species_filter() {
        let svc = service(0.2);
        let mismatch = svc.decide(ranked("persian", 0.91), Some(Species::Dog));
        assert_eq!(mismatch.error_kind, Some(RecognitionErrorKind::SpeciesMismatch));
        assert_eq!(mismatch.suggested_species, Some(Species::Cat));

        let matched = svc.decide(ranked("persian", 0.91), Some(Species::Cat));
        assert!(matched.success);
    }

    #[test]
    fn test_uncertainty_checked_before_species_filter() {
        let result = service(0.2).decide(ranked("persian", 0.1), Some(Species::Dog));
        assert_eq!(result.error_kind, Some(RecognitionErrorKind::Uncertain));
    }

    #[tokio::test]
    async fn test_unreadable_image_skips_model_load() {
        let svc = service(0.2);
        let result = svc.recognize_bytes(b"not an image".to_vec(), None).await;
        assert_eq!(result.error.as_deref(), Some("image unreadable"));
        assert_eq!(svc.models().load_attempts(), 0);
    }
}
