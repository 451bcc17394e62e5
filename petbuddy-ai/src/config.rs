//! Configuration for breed recognition
//!
//! Resolution: explicit path → `PETBUDDY_AI_CONFIG` → `<config dir>/petbuddy/petbuddy-ai.toml`
//! → compiled defaults. `PETBUDDY_CONFIDENCE_THRESHOLD` overrides the TOML threshold.

use petbuddy_common::config::{
    default_config_dir, load_toml_config, resolve_config_path, write_toml_config, LoggingConfig,
};
use petbuddy_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PETBUDDY_AI_CONFIG";

/// Environment variable overriding the confidence threshold
pub const THRESHOLD_ENV_VAR: &str = "PETBUDDY_CONFIDENCE_THRESHOLD";

/// Config file name inside the per-user config directory
pub const CONFIG_FILE_NAME: &str = "petbuddy-ai.toml";

/// Default acceptance threshold for the top-ranked prediction
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.2;

/// Top-level recognition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Predictions below this probability are reported as uncertain (0.0-1.0)
    pub confidence_threshold: f32,

    /// Labels that map to species Cat; everything else maps to Dog
    pub cat_breeds: Vec<String>,

    /// Upload size bounds enforced by the preprocessor
    pub limits: ImageLimits,

    /// Classifier model identity and preprocessing
    pub model: ModelConfig,

    pub logging: LoggingConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            cat_breeds: crate::taxonomy::default_cat_breeds(),
            limits: ImageLimits::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Maximum accepted image size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    /// Maximum encoded size in bytes (default 10 MiB)
    pub max_bytes: usize,
    /// Maximum decoded width in pixels
    pub max_width: u32,
    /// Maximum decoded height in pixels
    pub max_height: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_width: 4096,
            max_height: 4096,
        }
    }
}

/// Default model repository on the hub
pub const DEFAULT_MODEL_ID: &str = "Xenova/vit-base-patch16-224";

/// Classifier model source and input preprocessing
///
/// With both `model_path` and `labels_path` set the model is read from disk.
/// Otherwise the artifacts for `id` are downloaded from `hub_url` into the
/// per-user cache on first load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model repository identifier (`owner/name`)
    pub id: String,
    /// Path to the model artifact (ONNX file)
    pub model_path: Option<PathBuf>,
    /// Path to the label vocabulary (one label per line, index order)
    pub labels_path: Option<PathBuf>,
    /// Model hub base URL
    pub hub_url: String,
    /// Hub revision (branch, tag or commit)
    pub revision: String,
    /// ONNX file path inside the model repository
    pub model_file: String,
    /// Download cache (defaults to `<cache dir>/petbuddy/models`)
    pub cache_dir: Option<PathBuf>,
    /// Square input edge length in pixels
    pub input_size: u32,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            model_path: None,
            labels_path: None,
            hub_url: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            model_file: "onnx/model.onnx".to_string(),
            cache_dir: None,
            input_size: 224,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

impl RecognitionConfig {
    /// Resolve, load, override and validate the configuration
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: RecognitionConfig = load_toml_config(path.as_deref())?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            threshold = config.confidence_threshold,
            cat_breeds = config.cat_breeds.len(),
            model = %config.model.id,
            "Recognition configuration loaded"
        );
        Ok(config)
    }

    /// Write this configuration to the resolved config location
    ///
    /// An existing file is only replaced when `overwrite` is set.
    pub fn save(&self, explicit_path: Option<&Path>, overwrite: bool) -> Result<PathBuf> {
        self.validate()?;
        let path = resolve_config_path(explicit_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME)
            .or_else(|| default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)))
            .ok_or_else(|| Error::Config("No config location available".to_string()))?;
        if path.exists() && !overwrite {
            return Err(Error::Config(format!(
                "{} already exists (use --force to replace it)",
                path.display()
            )));
        }

        write_toml_config(self, &path)?;
        info!("Wrote recognition configuration to {}", path.display());
        Ok(path)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(THRESHOLD_ENV_VAR) {
            let value: f32 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: {:?}", THRESHOLD_ENV_VAR, raw))
            })?;
            if (value - self.confidence_threshold).abs() > f32::EPSILON {
                warn!(
                    "Confidence threshold overridden by {}: {} -> {}",
                    THRESHOLD_ENV_VAR, self.confidence_threshold, value
                );
            }
            self.confidence_threshold = value;
        }
        Ok(())
    }

    /// Reject values that would make recognition meaningless
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be within 0.0-1.0, got {}",
                self.confidence_threshold
            )));
        }
        if self.limits.max_bytes == 0 || self.limits.max_width == 0 || self.limits.max_height == 0 {
            return Err(Error::Config(
                "image limits must be greater than zero".to_string(),
            ));
        }
        if self.model.input_size == 0 {
            return Err(Error::Config("model.input_size must be greater than zero".to_string()));
        }
        if self.model.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(Error::Config("model.std entries must be finite and non-zero".to_string()));
        }
        if self.model.id.trim().is_empty() {
            return Err(Error::Config("model.id must not be empty".to_string()));
        }
        Ok(())
    }
}
