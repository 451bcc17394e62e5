//! Model hub download cache
//!
//! Resolves `model.id` to files on a Hugging Face style hub
//! (`<hub>/<id>/resolve/<revision>/<file>`) and keeps them under
//! `<cache>/<owner>--<name>/<revision>/`. Files already in the cache are never
//! fetched again. Downloads land in a `.part` file and are renamed into place,
//! so an interrupted fetch never leaves a truncated artifact behind.

use super::model_manager::ModelLoadError;
use crate::config::ModelConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Model config file carrying the label vocabulary (`id2label`)
pub const HUB_CONFIG_FILE: &str = "config.json";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Local copies of a hub model's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubArtifacts {
    pub model_path: PathBuf,
    pub config_path: PathBuf,
}

/// Downloads and caches one model repository revision
#[derive(Debug, Clone)]
pub struct ModelHub {
    base_url: String,
    model_id: String,
    revision: String,
    model_file: String,
    cache_dir: PathBuf,
}

impl ModelHub {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let model_id = config.id.trim();
        let mut parts = model_id.split('/');
        let valid_id = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if is_plain_segment(owner) && is_plain_segment(name)
        );
        if !valid_id {
            return Err(ModelLoadError::Fetch(format!(
                "model id {:?} is not of the form owner/name",
                config.id
            )));
        }
        if !is_relative_file(&config.model_file) || !is_plain_segment(&config.revision) {
            return Err(ModelLoadError::Fetch(format!(
                "model file {:?} at revision {:?} is not a valid hub path",
                config.model_file, config.revision
            )));
        }

        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => petbuddy_common::config::default_cache_dir()
                .map(|dir| dir.join("models"))
                .ok_or_else(|| {
                    ModelLoadError::Fetch("no cache directory available for downloads".to_string())
                })?,
        };

        Ok(Self {
            base_url: config.hub_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
            revision: config.revision.clone(),
            model_file: config.model_file.clone(),
            cache_dir,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Cache directory for this model revision
    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir
            .join(self.model_id.replace('/', "--"))
            .join(&self.revision)
    }

    /// Whether every artifact is already cached
    pub fn is_cached(&self) -> bool {
        let dir = self.model_dir();
        dir.join(&self.model_file).is_file() && dir.join(HUB_CONFIG_FILE).is_file()
    }

    /// Make sure the model and its config are cached, downloading what is missing
    ///
    /// Blocking; call from the blocking thread pool.
    pub fn fetch(&self) -> Result<HubArtifacts, ModelLoadError> {
        let dir = self.model_dir();
        let config_path = dir.join(HUB_CONFIG_FILE);
        let model_path = dir.join(&self.model_file);

        if config_path.is_file() && model_path.is_file() {
            debug!(model = %self.model_id, dir = %dir.display(), "Model artifacts cached");
            return Ok(HubArtifacts {
                model_path,
                config_path,
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| ModelLoadError::Fetch(format!("HTTP client: {}", e)))?;

        self.download(&client, HUB_CONFIG_FILE, &config_path)?;
        self.download(&client, &self.model_file, &model_path)?;

        Ok(HubArtifacts {
            model_path,
            config_path,
        })
    }

    fn download(
        &self,
        client: &reqwest::blocking::Client,
        remote: &str,
        local: &Path,
    ) -> Result<(), ModelLoadError> {
        if local.is_file() {
            return Ok(());
        }

        let url = format!(
            "{}/{}/resolve/{}/{}",
            self.base_url, self.model_id, self.revision, remote
        );
        info!(model = %self.model_id, %url, "Downloading model artifact");

        let bytes = client
            .get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(|e| ModelLoadError::Fetch(format!("{}: {}", url, e)))?;

        let io_error = |e: std::io::Error| ModelLoadError::Fetch(format!("{}: {}", local.display(), e));
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut part_name = local.as_os_str().to_owned();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        std::fs::write(&part, &bytes).map_err(io_error)?;
        if let Err(e) = std::fs::rename(&part, local) {
            let _ = std::fs::remove_file(&part);
            return Err(io_error(e));
        }

        info!(model = %self.model_id, file = remote, bytes = bytes.len(), "Model artifact cached");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct HubModelConfig {
    id2label: BTreeMap<String, String>,
}

/// Label vocabulary from a hub `config.json`, in output index order
///
/// Indices must be contiguous from zero.
pub fn read_hub_labels(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ModelLoadError::Fetch(format!("{}: {}", path.display(), e)))?;
    parse_hub_labels(&content).map_err(|e| match e {
        ModelLoadError::Parse(msg) => ModelLoadError::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

fn parse_hub_labels(content: &str) -> Result<Vec<String>, ModelLoadError> {
    let config: HubModelConfig =
        serde_json::from_str(content).map_err(|e| ModelLoadError::Parse(e.to_string()))?;

    let mut indexed = config
        .id2label
        .into_iter()
        .map(|(index, label)| {
            index
                .parse::<usize>()
                .map(|i| (i, label))
                .map_err(|_| ModelLoadError::Parse(format!("label index {:?} is not a number", index)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(i, _)| *i);

    if let Some(gap) = indexed.iter().enumerate().find(|(pos, (i, _))| pos != i) {
        return Err(ModelLoadError::Parse(format!("label index {} is missing", gap.0)));
    }
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\'])
}

fn is_relative_file(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
