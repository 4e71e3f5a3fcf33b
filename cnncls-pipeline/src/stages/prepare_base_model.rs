//! Base model preparation: pretrained base plus a trainable classifier head

use crate::backend::{CompileOptions, Model, ModelBackend, PretrainedSpec};
use cnncls_common::entity::{BaseModelConfig, FreezePolicy};
use cnncls_common::fs::ensure_directories;
use cnncls_common::Result;
use std::sync::Arc;
use tracing::{error, info};

pub struct PrepareBaseModel {
    config: BaseModelConfig,
    backend: Arc<dyn ModelBackend>,
}

impl PrepareBaseModel {
    pub fn new(config: BaseModelConfig, backend: Arc<dyn ModelBackend>) -> Self {
        Self { config, backend }
    }

    /// Instantiate the pretrained architecture and persist it to `base_model_path`
    pub fn get_base_model(&self) -> Result<Model> {
        let cfg = &self.config;
        let spec = PretrainedSpec {
            input_shape: cfg.image_size,
            include_top: cfg.include_top,
            weights: cfg.weights.clone(),
        };

        let model = ensure_directories(&[&cfg.root_dir])
            .and_then(|_| self.backend.pretrained(&spec))
            .and_then(|model| self.backend.save(&cfg.base_model_path, &model).map(|_| model))
            .map_err(|e| {
                error!("Failed to prepare base model: {}", e);
                e
            })?;

        info!(
            layers = model.layers.len(),
            path = %cfg.base_model_path.display(),
            "Base model saved"
        );
        Ok(model)
    }

    /// Freeze, attach the head, compile and persist to `updated_base_model_path`
    pub fn update_base_model(&self, base: Model) -> Result<Model> {
        let cfg = &self.config;
        let full = prepare_full_model(
            self.backend.as_ref(),
            base,
            cfg.classes,
            cfg.freeze_policy,
            cfg.learning_rate,
        )
        .and_then(|model| {
            self.backend
                .save(&cfg.updated_base_model_path, &model)
                .map(|_| model)
        })
        .map_err(|e| {
            error!("Failed to update base model: {}", e);
            e
        })?;

        info!(path = %cfg.updated_base_model_path.display(), "Updated base model saved");
        Ok(full)
    }

    pub fn run(&self) -> Result<()> {
        let base = self.get_base_model()?;
        self.update_base_model(base)?;
        Ok(())
    }
}

/// Apply `policy`, append Flatten + softmax Dense(`classes`), compile with SGD
pub fn prepare_full_model(
    backend: &dyn ModelBackend,
    mut model: Model,
    classes: usize,
    policy: FreezePolicy,
    learning_rate: f64,
) -> Result<Model> {
    model.apply_freeze_policy(policy);
    let full = model.with_classifier_head(classes);
    let full = backend.compile(full, CompileOptions::sgd_categorical(learning_rate))?;
    info!("{}", full.summary());
    Ok(full)
}
