//! Model training: fit the prepared model on the ingested dataset
//!
//! One directory tree feeds both subsets through a 20% validation split. The
//! validation flow is never shuffled; the training flow always is. With
//! AUGMENTATION unset the training flow reuses the validation generator as-is.

use crate::backend::{EpochStats, FitPlan, Fitted, Model, ModelBackend};
use crate::data::{Augmentation, BatchSource, DirectoryFlow, FlowConfig, ImageDataGenerator, Interpolation, Subset};
use cnncls_common::entity::ModelTrainerConfig;
use cnncls_common::{Error, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const TRAINING_VALIDATION_SPLIT: f64 = 0.20;

/// Pixel scale applied by every generator
pub const RESCALE: f32 = 1.0 / 255.0;

/// Training and validation flows over the same dataset
pub struct TrainValFlows {
    pub train: DirectoryFlow,
    pub validation: DirectoryFlow,
}

/// Full batches per pass; a trailing partial batch is not counted
pub fn steps(samples: usize, batch_size: usize) -> usize {
    samples.checked_div(batch_size).unwrap_or(0)
}

pub struct ModelTrainer {
    config: ModelTrainerConfig,
    backend: Arc<dyn ModelBackend>,
    shuffle_seed: Option<u64>,
}

impl ModelTrainer {
    pub fn new(config: ModelTrainerConfig, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            config,
            backend,
            shuffle_seed: None,
        }
    }

    /// Fix the training shuffle and augmentation sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Load the prepared model from `updated_base_model_path`
    pub fn get_base_model(&self) -> Result<Model> {
        self.backend
            .load(&self.config.updated_base_model_path)
            .map_err(|e| {
                error!(path = %self.config.updated_base_model_path.display(), "Failed to load base model: {}", e);
                e
            })
    }

    pub fn train_val_generator(&self) -> Result<TrainValFlows> {
        let cfg = &self.config;
        if cfg.batch_size == 0 {
            return Err(Error::InvalidInput("BATCH_SIZE must be positive".to_string()));
        }

        let flow = |subset: Subset, shuffle: bool, seed: Option<u64>| FlowConfig {
            target_size: cfg.image_size.target_size(),
            channels: cfg.image_size.channels,
            batch_size: cfg.batch_size,
            interpolation: Interpolation::Bilinear,
            subset,
            shuffle,
            seed,
        };

        let val_generator = ImageDataGenerator::new(RESCALE, TRAINING_VALIDATION_SPLIT);
        let validation =
            val_generator.flow_from_directory(&cfg.data_path, flow(Subset::Validation, false, None))?;

        let train_generator = if cfg.augmentation {
            ImageDataGenerator::new(RESCALE, TRAINING_VALIDATION_SPLIT)
                .with_augmentation(Augmentation::default())
        } else {
            val_generator
        };
        let train = train_generator.flow_from_directory(
            &cfg.data_path,
            flow(Subset::Training, true, self.shuffle_seed),
        )?;

        Ok(TrainValFlows { train, validation })
    }

    /// Fit for EPOCHS epochs and persist to `trained_model_file_path`
    pub fn train(&self, model: Model, flows: &mut TrainValFlows) -> Result<Fitted> {
        let cfg = &self.config;
        let plan = FitPlan {
            epochs: cfg.epochs,
            steps_per_epoch: steps(flows.train.samples(), cfg.batch_size),
            validation_steps: steps(flows.validation.samples(), cfg.batch_size),
        };
        if plan.steps_per_epoch == 0 {
            warn!(
                samples = flows.train.samples(),
                batch_size = cfg.batch_size,
                "Fewer training samples than one batch; no weight updates will run"
            );
        }
        info!(
            epochs = plan.epochs,
            steps_per_epoch = plan.steps_per_epoch,
            validation_steps = plan.validation_steps,
            "Training started"
        );

        let fitted = self
            .backend
            .fit(model, &mut flows.train, &mut flows.validation, &plan)
            .and_then(|fitted| {
                self.backend
                    .save(&cfg.trained_model_file_path, &fitted.model)
                    .map(|_| fitted)
            })
            .map_err(|e| {
                error!("Model training failed: {}", e);
                e
            })?;

        log_history(&fitted.history);
        info!(path = %cfg.trained_model_file_path.display(), "Trained model saved");
        Ok(fitted)
    }

    pub fn run(&self) -> Result<()> {
        let model = self.get_base_model()?;
        let mut flows = self.train_val_generator().map_err(|e| {
            error!(data_path = %self.config.data_path.display(), "Failed to build data generators: {}", e);
            e
        })?;
        self.train(model, &mut flows)?;
        Ok(())
    }
}

fn log_history(history: &[EpochStats]) {
    for stats in history {
        info!(
            epoch = stats.epoch,
            loss = stats.loss,
            accuracy = stats.accuracy,
            val_loss = ?stats.val_loss,
            val_accuracy = ?stats.val_accuracy,
            "Epoch summary"
        );
    }
}
