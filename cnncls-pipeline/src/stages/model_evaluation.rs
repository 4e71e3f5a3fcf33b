//! Model evaluation: score the trained model and record it in a tracking run

use crate::backend::{Model, ModelBackend, Score};
use crate::data::{FlowConfig, ImageDataGenerator, Interpolation, Subset};
use crate::services::{RunInfo, RunStatus, TrackingClient};
use cnncls_common::entity::ModelEvaluationConfig;
use cnncls_common::fs::{ensure_directories, save_json};
use cnncls_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const EVALUATION_VALIDATION_SPLIT: f64 = 0.30;

/// Registry name used when the tracking store supports registration
pub const REGISTERED_MODEL_NAME: &str = "VGG16Model";

const RESCALE: f32 = 1.0 / 255.0;

/// Model and score produced by [`ModelEvaluation::evaluation`]
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub model: Model,
    pub score: Score,
}

/// What a tracking run recorded
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub run_id: String,
    pub scores_path: PathBuf,
    pub registered_as: Option<String>,
}

/// `scores_<run_id>.json` under `root_dir`
pub fn scores_file(root_dir: &Path, run_id: &str) -> PathBuf {
    root_dir.join(format!("scores_{}.json", run_id))
}

/// Persist `{"loss", "accuracy"}` to `path`
pub fn save_score(path: &Path, score: &Score) -> Result<()> {
    save_json(path, score)
}

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    backend: Arc<dyn ModelBackend>,
}

impl ModelEvaluation {
    pub fn new(config: ModelEvaluationConfig, backend: Arc<dyn ModelBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ModelEvaluationConfig {
        &self.config
    }

    /// Load the trained model and score it over one pass of the validation subset
    pub fn evaluation(&self) -> Result<EvaluationOutcome> {
        let cfg = &self.config;
        let outcome = self.evaluate_inner();
        match &outcome {
            Ok(o) => info!(loss = o.score.loss, accuracy = o.score.accuracy, "Model evaluated"),
            Err(e) => error!(model = %cfg.model_path.display(), "Model evaluation failed: {}", e),
        }
        outcome
    }

    fn evaluate_inner(&self) -> Result<EvaluationOutcome> {
        let cfg = &self.config;
        if cfg.batch_size == 0 {
            return Err(Error::InvalidInput("BATCH_SIZE must be positive".to_string()));
        }
        let model = self.backend.load(&cfg.model_path)?;

        let generator = ImageDataGenerator::new(RESCALE, EVALUATION_VALIDATION_SPLIT);
        let mut validation = generator.flow_from_directory(
            &cfg.data_path,
            FlowConfig {
                target_size: cfg.image_size.target_size(),
                channels: cfg.image_size.channels,
                batch_size: cfg.batch_size,
                interpolation: Interpolation::Bilinear,
                subset: Subset::Validation,
                shuffle: false,
                seed: None,
            },
        )?;

        let score = self.backend.evaluate(&model, &mut validation)?;
        Ok(EvaluationOutcome { model, score })
    }

    /// Record params, metrics, the score file and the model in one tracking run
    ///
    /// The run ends FINISHED when every step succeeds and FAILED otherwise.
    pub fn log_into_mlflow(
        &self,
        outcome: &EvaluationOutcome,
        tracker: &dyn TrackingClient,
    ) -> Result<ScoreRecord> {
        let run = tracker.start_run().map_err(|e| {
            error!("Failed to start tracking run: {}", e);
            e
        })?;

        match self.record(&run, outcome, tracker) {
            Ok(record) => {
                tracker.end_run(&run, RunStatus::Finished)?;
                info!(run_id = %record.run_id, scores = %record.scores_path.display(), "Evaluation recorded");
                Ok(record)
            }
            Err(e) => {
                error!(run_id = %run.run_id, "Failed to record evaluation: {}", e);
                if let Err(end_err) = tracker.end_run(&run, RunStatus::Failed) {
                    warn!(run_id = %run.run_id, "Failed to close tracking run: {}", end_err);
                }
                Err(e)
            }
        }
    }

    fn record(
        &self,
        run: &RunInfo,
        outcome: &EvaluationOutcome,
        tracker: &dyn TrackingClient,
    ) -> Result<ScoreRecord> {
        let cfg = &self.config;
        tracker.log_params(run, &cfg.params)?;

        let mut metrics = BTreeMap::new();
        metrics.insert("loss".to_string(), outcome.score.loss);
        metrics.insert("accuracy".to_string(), outcome.score.accuracy);
        tracker.log_metrics(run, &metrics)?;

        ensure_directories(&[&cfg.root_dir])?;
        let scores_path = scores_file(&cfg.root_dir, &run.run_id);
        save_score(&scores_path, &outcome.score)?;

        let registered_as = if tracker.store().is_local() {
            None
        } else {
            Some(REGISTERED_MODEL_NAME.to_string())
        };
        tracker.log_model(run, &cfg.model_path, registered_as.as_deref())?;

        Ok(ScoreRecord {
            run_id: run.run_id.clone(),
            scores_path,
            registered_as,
        })
    }

    pub fn run(&self, tracker: &dyn TrackingClient) -> Result<ScoreRecord> {
        let outcome = self.evaluation()?;
        self.log_into_mlflow(&outcome, tracker)
    }
}
