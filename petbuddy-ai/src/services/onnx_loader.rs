//! ONNX Runtime model loader
//!
//! Loads an image-classification graph (NCHW f32 in, one logit per label out).
//! Local files (`model.model_path` + `model.labels_path`) take precedence;
//! otherwise the model named by `model.id` is fetched through the hub cache.

use super::classifier::{InferenceBackend, InferenceError, ModelInput, PreprocessSpec};
use super::model_hub::{read_hub_labels, ModelHub};
use super::model_manager::{LoadedModel, ModelLoadError, ModelLoader};
use crate::config::ModelConfig;
use ndarray::Array4;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Where the model artifacts come from
#[derive(Debug, Clone)]
enum ModelSource {
    /// ONNX file plus a one-label-per-line vocabulary
    Local { model_path: PathBuf, labels_path: PathBuf },
    /// Downloaded on first load; labels come from the hub `config.json`
    Hub(ModelHub),
}

/// Loads an ONNX classifier from local files or the model hub
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model_id: String,
    source: ModelSource,
    preprocess: PreprocessSpec,
}

impl OnnxModelLoader {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let source = match (&config.model_path, &config.labels_path) {
            (Some(model_path), Some(labels_path)) => ModelSource::Local {
                model_path: model_path.clone(),
                labels_path: labels_path.clone(),
            },
            (None, None) => ModelSource::Hub(ModelHub::from_config(config)?),
            _ => {
                return Err(ModelLoadError::Fetch(
                    "model.model_path and model.labels_path must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            model_id: config.id.clone(),
            source,
            preprocess: PreprocessSpec::from(config),
        })
    }

    /// Whether the model comes from the hub rather than local files
    pub fn uses_hub(&self) -> bool {
        matches!(self.source, ModelSource::Hub(_))
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<LoadedModel, ModelLoadError> {
        let (model_path, labels) = match &self.source {
            ModelSource::Local {
                model_path,
                labels_path,
            } => (model_path.clone(), read_labels(labels_path)?),
            ModelSource::Hub(hub) => {
                let artifacts = hub.fetch()?;
                (artifacts.model_path, read_hub_labels(&artifacts.config_path)?)
            }
        };
        let backend = OnnxBackend::open(&model_path)?;

        debug!(
            model = %model_path.display(),
            input = %backend.input_name,
            output = %backend.output_name,
            "ONNX session created"
        );

        Ok(LoadedModel {
            model_id: self.model_id.clone(),
            preprocess: self.preprocess,
            labels,
            backend: Box::new(backend),
        })
    }
}

/// One label per line, index order; blank lines skipped
fn read_labels(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ModelLoadError::Fetch(format!("{}: {}", path.display(), e)))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// ONNX Runtime session wrapped for shared use
///
/// `Session::run` takes `&mut self`, so concurrent predictions serialize on
/// the mutex.
pub struct OnnxBackend {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxBackend {
    pub fn open(path: &Path) -> Result<Self, ModelLoadError> {
        let session = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| ModelLoadError::Parse(format!("{}: {}", path.display(), e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ModelLoadError::Invalid("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelLoadError::Invalid("model declares no outputs".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn forward(&self, input: &ModelInput) -> Result<Vec<f32>, InferenceError> {
        let [n, c, h, w] = input.shape();
        let array = Array4::from_shape_vec((n, c, h, w), input.data().to_vec())
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let tensor =
            TensorRef::from_array_view(array.view()).map_err(|e| InferenceError::Backend(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Backend("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let (_shape, scores) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        Ok(scores.to_vec())
    }
}
