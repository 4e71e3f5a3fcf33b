//! Per-run configuration resolver
//!
//! One `ConfigResolver` is built per pipeline invocation and shared read-only
//! by every stage. Each accessor derives a fresh stage configuration from the
//! two loaded documents and creates that stage's root directory.

use super::{
    load_parameters, load_structural, ParameterConfig, StructuralConfig, DEFAULT_TRACKING_URI,
};
use crate::entity::{
    BaseModelConfig, DataIngestionConfig, FreezePolicy, ModelEvaluationConfig, ModelTrainerConfig,
};
use crate::fs::ensure_directories;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Directory names produced by archive tools rather than by the dataset
const IGNORED_DIR_NAMES: &[&str] = &["__MACOSX"];

/// Typed view over the structural and parameter documents
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    structural: StructuralConfig,
    params: ParameterConfig,
}

impl ConfigResolver {
    /// Load both documents and create the artifacts root
    pub fn new(config_path: &Path, params_path: &Path) -> Result<Self> {
        let structural = load_structural(config_path)?;
        let params = load_parameters(params_path)?;
        Self::from_parts(structural, params)
    }

    /// Build from already-parsed documents
    pub fn from_parts(structural: StructuralConfig, params: ParameterConfig) -> Result<Self> {
        ensure_directories(&[&structural.artifacts_root])?;
        Ok(Self { structural, params })
    }

    pub fn structural(&self) -> &StructuralConfig {
        &self.structural
    }

    pub fn parameters(&self) -> &ParameterConfig {
        &self.params
    }

    pub fn resolve_data_ingestion_config(&self) -> Result<DataIngestionConfig> {
        let cfg = &self.structural.data_ingestion;
        ensure_directories(&[&cfg.root_dir])?;

        Ok(DataIngestionConfig {
            root_dir: cfg.root_dir.clone(),
            source_url: cfg.source_url.clone(),
            local_data_file: cfg.local_data_file.clone(),
            unzip_dir: cfg.unzip_dir.clone(),
            prefix: cfg.prefix.clone(),
        })
    }

    pub fn resolve_base_model_config(&self) -> Result<BaseModelConfig> {
        let cfg = &self.structural.prepare_base_model;
        let params = &self.params;
        ensure_directories(&[&cfg.root_dir])?;

        Ok(BaseModelConfig {
            root_dir: cfg.root_dir.clone(),
            base_model_path: cfg.base_model_path.clone(),
            updated_base_model_path: cfg.updated_base_model_path.clone(),
            image_size: params.image_size,
            learning_rate: params.learning_rate,
            include_top: params.include_top,
            weights: params.weights.clone(),
            classes: params.classes,
            freeze_policy: FreezePolicy::from_flags(params.freeze_all, params.freeze_till),
        })
    }

    /// Requires the ingestion stage to have extracted its archive
    pub fn resolve_model_trainer_config(&self) -> Result<ModelTrainerConfig> {
        let cfg = &self.structural.model_trainer;
        let params = &self.params;

        let data_path = discover_dataset_dir(&self.structural.data_ingestion.unzip_dir)?;
        ensure_directories(&[&cfg.root_dir])?;

        Ok(ModelTrainerConfig {
            root_dir: cfg.root_dir.clone(),
            trained_model_file_path: cfg.trained_model_file_path.clone(),
            updated_base_model_path: self.structural.prepare_base_model.updated_base_model_path.clone(),
            data_path,
            image_size: params.image_size,
            epochs: params.epochs,
            batch_size: params.batch_size,
            augmentation: params.augmentation,
        })
    }

    pub fn resolve_model_evaluation_config(&self) -> Result<ModelEvaluationConfig> {
        let trainer = &self.structural.model_trainer;
        let section = &self.structural.model_evaluation;
        let params = &self.params;

        let root_dir = section
            .root_dir
            .clone()
            .unwrap_or_else(|| self.structural.artifacts_root.join("model_evaluation"));
        let mlflow_uri = section
            .mlflow_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string());

        let data_path = discover_dataset_dir(&self.structural.data_ingestion.unzip_dir)?;
        ensure_directories(&[&root_dir])?;

        Ok(ModelEvaluationConfig {
            root_dir,
            model_path: trainer.trained_model_file_path.clone(),
            data_path,
            params: params.to_param_map()?,
            mlflow_uri,
            image_size: params.image_size,
            batch_size: params.batch_size,
        })
    }
}

/// Locate the extracted dataset: the single top-level subdirectory of `unzip_dir`
///
/// Hidden entries and archive metadata folders are skipped. No candidate is
/// [`Error::ArtifactNotFound`]; several are [`Error::AmbiguousArtifact`].
pub fn discover_dataset_dir(unzip_dir: &Path) -> Result<PathBuf> {
    if !unzip_dir.is_dir() {
        return Err(Error::artifact_not_found(
            unzip_dir,
            "extraction directory does not exist; run data ingestion first",
        ));
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(unzip_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || IGNORED_DIR_NAMES.contains(&name.as_str()) {
            continue;
        }
        candidates.push(entry.path());
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(Error::artifact_not_found(
            unzip_dir,
            "no extracted dataset directory found",
        )),
        1 => {
            let found = candidates.remove(0);
            tracing::debug!(data_path = %found.display(), "Discovered dataset directory");
            Ok(found)
        }
        _ => Err(Error::AmbiguousArtifact {
            path: unzip_dir.to_path_buf(),
            candidates,
        }),
    }
}
