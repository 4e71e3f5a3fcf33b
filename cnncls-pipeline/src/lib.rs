//! cnncls-pipeline library
//!
//! Training pipeline for the CT-scan image classifier: dataset ingestion,
//! transfer-learning model preparation, training and tracked evaluation.

pub mod backend;
pub mod data;
pub mod services;
pub mod stages;
pub mod workflow;

pub use workflow::{Collaborators, Pipeline, PipelineStage, StageName};

use cnncls_common::{ConfigResolver, Result};
use std::path::Path;

/// Load both configuration sources and run every stage in order
pub fn run_pipeline(config_path: &Path, params_path: &Path, collaborators: Collaborators) -> Result<()> {
    let resolver = ConfigResolver::new(config_path, params_path)?;
    Pipeline::standard(collaborators).run(&resolver)
}
