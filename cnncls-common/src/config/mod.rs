//! Configuration documents and source resolution
//!
//! Two sources drive a pipeline run:
//! - the structural document (`config/config.yaml`): artifact paths and URLs
//! - the parameter document (`params.yaml`): hyperparameters
//!
//! Both are read through [`read_document`], which accepts YAML or TOML by file
//! extension and rejects missing or empty files with [`Error::ConfigLoad`].
//! Source locations follow the usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Compiled default (fallback)

mod resolver;

pub use resolver::{discover_dataset_dir, ConfigResolver};

use crate::entity::ImageSize;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default structural document location
pub const DEFAULT_CONFIG_FILE: &str = "config/config.yaml";
/// Default parameter document location
pub const DEFAULT_PARAMS_FILE: &str = "params.yaml";
/// Environment override for the structural document
pub const CONFIG_ENV_VAR: &str = "CNNCLS_CONFIG";
/// Environment override for the parameter document
pub const PARAMS_ENV_VAR: &str = "CNNCLS_PARAMS";
/// Tracking store used when the structural document names none
pub const DEFAULT_TRACKING_URI: &str = "file:mlruns";

/// Resolve a configuration source location
///
/// Priority: explicit argument, then `env_var_name`, then `default`.
pub fn resolve_source_path(cli_arg: Option<&Path>, env_var_name: &str, default: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    PathBuf::from(default)
}

/// Structural configuration: where inputs come from and outputs go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralConfig {
    pub artifacts_root: PathBuf,
    pub data_ingestion: DataIngestionSection,
    pub prepare_base_model: PrepareBaseModelSection,
    pub model_trainer: ModelTrainerSection,
    #[serde(default)]
    pub model_evaluation: ModelEvaluationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionSection {
    pub root_dir: PathBuf,
    pub source_url: String,
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareBaseModelSection {
    pub root_dir: PathBuf,
    pub base_model_path: PathBuf,
    pub updated_base_model_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerSection {
    pub root_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
}

/// Optional block; both fields fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationSection {
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub mlflow_uri: Option<String>,
}

/// Parameter configuration: hyperparameters, keyed as in `params.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    #[serde(rename = "IMAGE_SIZE")]
    pub image_size: ImageSize,
    #[serde(rename = "LEARNING_RATE")]
    pub learning_rate: f64,
    #[serde(rename = "INCLUDE_TOP")]
    pub include_top: bool,
    #[serde(rename = "WEIGHTS")]
    pub weights: String,
    #[serde(rename = "CLASSES")]
    pub classes: usize,
    #[serde(rename = "EPOCHS")]
    pub epochs: usize,
    #[serde(rename = "BATCH_SIZE")]
    pub batch_size: usize,
    #[serde(rename = "AUGMENTATION")]
    pub augmentation: bool,
    #[serde(rename = "FREEZE_ALL", default = "default_freeze_all")]
    pub freeze_all: bool,
    #[serde(rename = "FREEZE_TILL", default, skip_serializing_if = "Option::is_none")]
    pub freeze_till: Option<usize>,
}

fn default_freeze_all() -> bool {
    true
}

impl ParameterConfig {
    /// Flatten into string pairs for experiment tracking
    pub fn to_param_map(&self) -> Result<BTreeMap<String, String>> {
        let value = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(Error::backend(format!(
                    "parameters did not serialize to a map: {}",
                    other
                )))
            }
        };

        Ok(value
            .into_iter()
            .map(|(key, v)| {
                let rendered = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, rendered)
            })
            .collect())
    }
}

/// Read a YAML or TOML document into a generic value
///
/// Fails with [`Error::ConfigLoad`] when the file is missing, unparseable, or
/// holds an empty document.
pub fn read_document(path: &Path) -> Result<serde_json::Value> {
    if !path.exists() {
        return Err(Error::config_load(path, "file not found"));
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(Error::config_load(path, "document is empty"));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let value: serde_json::Value = match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|e| Error::config_load(path, e))?,
        _ => serde_yaml::from_str(&content).map_err(|e| Error::config_load(path, e))?,
    };

    let empty = match &value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(Error::config_load(path, "document is empty"));
    }

    tracing::info!(path = %path.display(), "Loaded configuration document");
    Ok(value)
}

/// Deserialize a typed document, failing fast on missing fields
pub fn load_typed<T: DeserializeOwned>(path: &Path, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::config_load(path, e))
}

/// Load the structural document
pub fn load_structural(path: &Path) -> Result<StructuralConfig> {
    let value = read_document(path)?;
    load_typed(path, value)
}

/// Load the parameter document
///
/// Keys may sit at the top level or under a single `params` key.
pub fn load_parameters(path: &Path) -> Result<ParameterConfig> {
    let value = read_document(path)?;
    let value = match value {
        serde_json::Value::Object(mut map) if map.len() == 1 && map.contains_key("params") => {
            map.remove("params").unwrap_or_default()
        }
        other => other,
    };
    load_typed(path, value)
}
