//! Recognition pipeline components
//!
//! Leaf-first: preprocessor → model manager → classifier → confidence gate,
//! orchestrated by the recognition service.

pub mod classifier;
pub mod confidence_gate;
#[cfg(feature = "onnx")]
pub mod model_hub;
pub mod model_manager;
#[cfg(feature = "onnx")]
pub mod onnx_loader;
pub mod preprocessor;
pub mod recognition;

pub use classifier::{InferenceBackend, InferenceError, ModelInput, PreprocessSpec, RankedLabel};
pub use confidence_gate::{ConfidenceGate, GateOutcome};
pub use model_manager::{LoadedModel, ModelHandle, ModelLoadError, ModelLoader, ModelManager};
#[cfg(feature = "onnx")]
pub use model_hub::{HubArtifacts, ModelHub};
#[cfg(feature = "onnx")]
pub use onnx_loader::{OnnxBackend, OnnxModelLoader};
pub use preprocessor::{ImagePreprocessor, NormalizedImage, PreprocessError};
pub use recognition::RecognitionService;
