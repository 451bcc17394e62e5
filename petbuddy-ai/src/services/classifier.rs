//! Image classifier
//!
//! `predict` is a pure function of (model, image): resize to the model input
//! size, normalize per channel into an NCHW tensor, run the backend, softmax
//! the scores and return the arg-max label.

use super::model_manager::ModelHandle;
use super::preprocessor::NormalizedImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inference errors
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Backend produced a different number of scores than the label vocabulary
    #[error("Output shape mismatch: expected {expected} scores, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Backend produced NaN/inf or an empty output
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    /// Backend runtime failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Input preprocessing expected by a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSpec {
    /// Square input edge length
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl From<&crate::config::ModelConfig> for PreprocessSpec {
    fn from(config: &crate::config::ModelConfig) -> Self {
        Self {
            input_size: config.input_size,
            mean: config.mean,
            std: config.std,
        }
    }
}

/// Single-image NCHW f32 tensor
#[derive(Debug, Clone)]
pub struct ModelInput {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ModelInput {
    /// `[1, 3, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Runs a model forward pass
///
/// Returns one raw score (logit) per vocabulary entry. Implementations must
/// not mutate model weights; they may be called concurrently.
pub trait InferenceBackend: Send + Sync {
    fn forward(&self, input: &ModelInput) -> Result<Vec<f32>, InferenceError>;
}

/// Highest-probability label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    /// Softmax probability (0.0-1.0)
    pub probability: f32,
}

/// Classify an image with a loaded model
pub fn predict(model: &ModelHandle, image: &NormalizedImage) -> Result<RankedLabel, InferenceError> {
    let input = prepare_input(image, model.preprocess());
    let scores = model.backend().forward(&input)?;

    let labels = model.labels();
    if scores.len() != labels.len() {
        return Err(InferenceError::ShapeMismatch {
            expected: labels.len(),
            actual: scores.len(),
        });
    }
    if scores.is_empty() {
        return Err(InferenceError::InvalidOutput("empty score vector".to_string()));
    }
    if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
        return Err(InferenceError::InvalidOutput(format!(
            "non-finite score at index {}",
            bad
        )));
    }

    let probabilities = softmax(&scores);
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    Ok(RankedLabel {
        label: labels[index].clone(),
        probability: probability.clamp(0.0, 1.0),
    })
}

/// Resize and normalize into a `[1, 3, size, size]` tensor
pub fn prepare_input(image: &NormalizedImage, spec: &PreprocessSpec) -> ModelInput {
    let size = spec.input_size;
    let resized = if image.width() == size && image.height() == size {
        image.pixels().clone()
    } else {
        imageops::resize(image.pixels(), size, size, FilterType::Triangle)
    };

    let plane = (size as usize) * (size as usize);
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y as usize) * (size as usize) + (x as usize);
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            data[c * plane + offset] = (value - spec.mean[c]) / spec.std[c];
        }
    }

    ModelInput {
        data,
        shape: [1, 3, size as usize, size as usize],
    }
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
