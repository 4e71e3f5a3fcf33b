//! Pipeline runner
//!
//! **Responsibilities:**
//! - Fixed stage order: ingestion, base model, training, evaluation
//! - One [`ConfigResolver`] shared by every stage of a run
//! - Fail-fast: the first failing stage aborts the remaining ones
//!
//! **Architecture:** each stage is a [`PipelineStage`] that resolves its own
//! configuration at run time, so a stage whose upstream artifact is missing
//! fails during resolution rather than mid-work.

pub mod pipeline;

pub use pipeline::{Collaborators, Pipeline, TrackingFactory};

use cnncls_common::{ConfigResolver, Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    DataIngestion,
    PrepareBaseModel,
    ModelTrainer,
    ModelEvaluation,
}

impl StageName {
    /// Execution order of a full run
    pub const ALL: [StageName; 4] = [
        StageName::DataIngestion,
        StageName::PrepareBaseModel,
        StageName::ModelTrainer,
        StageName::ModelEvaluation,
    ];

    /// Identifier accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::DataIngestion => "data_ingestion",
            StageName::PrepareBaseModel => "prepare_base_model",
            StageName::ModelTrainer => "model_trainer",
            StageName::ModelEvaluation => "model_evaluation",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StageName::DataIngestion => "Data ingestion",
            StageName::PrepareBaseModel => "Prepare base model",
            StageName::ModelTrainer => "Model training",
            StageName::ModelEvaluation => "Model evaluation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_end_matches("_pipeline");
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = StageName::ALL.iter().map(|s| s.as_str()).collect();
                Error::InvalidInput(format!("unknown stage '{}' (expected one of: {})", s, known.join(", ")))
            })
    }
}

/// One unit of pipeline work
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> StageName;

    /// Resolve this stage's configuration from `resolver` and execute it
    fn run(&self, resolver: &ConfigResolver) -> Result<()>;
}
