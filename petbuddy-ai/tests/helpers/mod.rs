//! Shared test helpers: scripted model loaders and in-memory image fixtures

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use petbuddy_ai::services::{
    InferenceBackend, InferenceError, LoadedModel, ModelInput, ModelLoadError, ModelLoader,
    ModelManager, PreprocessSpec,
};
use petbuddy_ai::{RecognitionConfig, RecognitionService};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend that ignores its input and returns fixed logits
pub struct FixedLogits(pub Vec<f32>);

impl InferenceBackend for FixedLogits {
    fn forward(&self, _input: &ModelInput) -> Result<Vec<f32>, InferenceError> {
        Ok(self.0.clone())
    }
}

/// Backend that always fails at runtime
pub struct BrokenBackend;

impl InferenceBackend for BrokenBackend {
    fn forward(&self, _input: &ModelInput) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Backend("tensor shape [1, 3, 8, 8] not accepted".to_string()))
    }
}

/// Model whose top prediction is `label` with softmax probability `probability`
///
/// The vocabulary is `label` followed by fillers that share the remaining mass,
/// each strictly below `probability`; logits are log-probabilities so softmax
/// reproduces them exactly (up to float rounding).
pub fn prediction_model(label: &str, probability: f32) -> LoadedModel {
    let rest = 1.0 - probability;
    let fillers = (rest / probability).floor() as usize + 2;
    let share = rest / fillers as f32;

    let mut labels = vec![label.to_string()];
    let mut logits = vec![probability.ln()];
    for i in 0..fillers {
        labels.push(format!("filler_{}", i));
        logits.push(share.ln());
    }

    LoadedModel {
        model_id: "test/fixed".to_string(),
        preprocess: PreprocessSpec {
            input_size: 8,
            mean: [0.5; 3],
            std: [0.5; 3],
        },
        labels,
        backend: Box::new(FixedLogits(logits)),
    }
}

/// Loader that counts calls, optionally sleeps, and fails a set number of times
pub struct ScriptedLoader {
    label: String,
    probability: f32,
    failures: usize,
    delay: Duration,
    broken_backend: bool,
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(label: &str, probability: f32) -> Self {
        Self {
            label: label.to_string(),
            probability,
            failures: 0,
            delay: Duration::ZERO,
            broken_backend: false,
            loads: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` loads with a fetch error
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures = n;
        self
    }

    /// Block inside `load` for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Load succeeds but inference fails
    pub fn with_broken_backend(mut self) -> Self {
        self.broken_backend = true;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self) -> Result<LoadedModel, ModelLoadError> {
        let call = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if call <= self.failures {
            return Err(ModelLoadError::Fetch(format!("network unreachable (call {})", call)));
        }

        let mut model = prediction_model(&self.label, self.probability);
        if self.broken_backend {
            model.backend = Box::new(BrokenBackend);
        }
        Ok(model)
    }
}

/// Recognition service over `loader` with the given threshold
pub fn service_with(loader: Arc<ScriptedLoader>, threshold: f32) -> RecognitionService {
    let config = RecognitionConfig {
        confidence_threshold: threshold,
        ..Default::default()
    };
    RecognitionService::new(&config, Arc::new(ModelManager::new(loader)))
}

/// Solid-color photo encoded in `format`
pub fn photo(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut buf, format)
        .expect("encode test image");
    buf.into_inner()
}

pub fn png_photo() -> Vec<u8> {
    photo(32, 24, ImageFormat::Png)
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}
