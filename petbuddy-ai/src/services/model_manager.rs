//! Classifier model lifecycle
//!
//! One model per process, loaded lazily on first use and resident until
//! shutdown. Concurrent first callers are serialized by the `OnceCell`: exactly
//! one load runs, everyone observes the same handle. A failed load leaves the
//! cell empty, so the next caller retries.
//!
//! The get-or-init runs on a spawned task, not in the caller's future. A caller
//! that is dropped mid-load (timeout, cancelled session) does not abort the
//! load; the finished model is still stored for the next caller.

use super::classifier::{InferenceBackend, PreprocessSpec};
use chrono::Utc;
use petbuddy_common::{EventBus, PetBuddyEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Model loading errors
#[derive(Debug, Clone, Error)]
pub enum ModelLoadError {
    /// Weights or vocabulary could not be fetched/read
    #[error("Model fetch failed: {0}")]
    Fetch(String),

    /// Artifact exists but could not be parsed
    #[error("Model parse failed: {0}")]
    Parse(String),

    /// Loaded model is unusable (e.g. empty vocabulary)
    #[error("Invalid model: {0}")]
    Invalid(String),

    /// Loader task panicked or was aborted
    #[error("Model loader task failed: {0}")]
    Task(String),
}

/// Everything a classifier needs from a loaded model
pub struct LoadedModel {
    pub model_id: String,
    pub preprocess: PreprocessSpec,
    /// Label vocabulary in output index order
    pub labels: Vec<String>,
    pub backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_id", &self.model_id)
            .field("preprocess", &self.preprocess)
            .field("labels", &self.labels.len())
            .finish()
    }
}

/// Shared, read-only handle to the resident model
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<LoadedModel>,
}

impl ModelHandle {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            inner: Arc::new(model),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    pub fn preprocess(&self) -> &PreprocessSpec {
        &self.inner.preprocess
    }

    pub fn labels(&self) -> &[String] {
        &self.inner.labels
    }

    pub fn backend(&self) -> &dyn InferenceBackend {
        self.inner.backend.as_ref()
    }

    /// True when both handles point at the same resident model
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// External model provider
///
/// `load` is blocking (network fetch, disk read, graph parse) and runs on the
/// blocking thread pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<LoadedModel, ModelLoadError>;
}

/// Owns the process-wide model handle
pub struct ModelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<ModelHandle>,
    load_attempts: AtomicU64,
    event_bus: Option<EventBus>,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self::build(loader, None)
    }

    /// Announce successful loads on the event bus
    pub fn with_event_bus(self, event_bus: EventBus) -> Self {
        let loader = Arc::clone(&self.inner.loader);
        Self::build(loader, Some(event_bus))
    }

    fn build(loader: Arc<dyn ModelLoader>, event_bus: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                loader,
                model: OnceCell::new(),
                load_attempts: AtomicU64::new(0),
                event_bus,
            }),
        }
    }

    /// Get the resident model, loading it on first use
    pub async fn get_model(&self) -> Result<ModelHandle, ModelLoadError> {
        if let Some(handle) = self.inner.model.get() {
            return Ok(handle.clone());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .model
                .get_or_try_init(|| inner.load())
                .await
                .cloned()
        })
        .await
        .map_err(|e| ModelLoadError::Task(e.to_string()))?
    }

    /// Whether a model is resident
    pub fn is_loaded(&self) -> bool {
        self.inner.model.initialized()
    }

    /// Number of load attempts made so far (successful or not)
    pub fn load_attempts(&self) -> u64 {
        self.inner.load_attempts.load(Ordering::SeqCst)
    }
}

impl ManagerInner {
    async fn load(&self) -> Result<ModelHandle, ModelLoadError> {
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let loader = Arc::clone(&self.loader);
        let started = Instant::now();

        info!(attempt, "Loading classifier model");

        let loaded = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| ModelLoadError::Task(e.to_string()))
            .and_then(|result| result)
            .and_then(|model| {
                if model.labels.is_empty() {
                    Err(ModelLoadError::Invalid("label vocabulary is empty".to_string()))
                } else {
                    Ok(model)
                }
            });

        let model = match loaded {
            Ok(model) => model,
            Err(e) => {
                error!(attempt, error = %e, "Classifier model load failed");
                return Err(e);
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            attempt,
            model = %model.model_id,
            labels = model.labels.len(),
            elapsed_ms,
            "Classifier model loaded"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PetBuddyEvent::ModelLoaded {
                model_id: model.model_id.clone(),
                labels: model.labels.len(),
                elapsed_ms,
                timestamp: Utc::now(),
            });
        }

        Ok(ModelHandle::new(model))
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("loaded", &self.is_loaded())
            .field("load_attempts", &self.load_attempts())
            .finish()
    }
}
