//! Stage adapters and the ordered runner

use super::{PipelineStage, StageName};
use crate::backend::{ModelBackend, NativeBackend};
use crate::services::{connect, ArchiveExtractor, ArchiveFetcher, HttpFetcher, TrackingClient, ZipExtractor};
use crate::stages::{DataIngestion, ModelEvaluation, ModelTrainer, PrepareBaseModel};
use cnncls_common::{ConfigResolver, Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Builds a tracking client for a tracking URI
pub type TrackingFactory = Arc<dyn Fn(&str) -> Result<Box<dyn TrackingClient>> + Send + Sync>;

/// External collaborators shared by the stages of one pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub backend: Arc<dyn ModelBackend>,
    pub tracking: TrackingFactory,
    /// Fixed training shuffle seed; `None` draws from entropy
    pub training_seed: Option<u64>,
}

impl Collaborators {
    /// HTTP download, ZIP extraction, native backend, URI-selected tracking
    pub fn production() -> Result<Self> {
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::new()?),
            extractor: Arc::new(ZipExtractor),
            backend: Arc::new(NativeBackend::new()),
            tracking: Arc::new(|uri: &str| connect(uri)),
            training_seed: None,
        })
    }
}

struct DataIngestionStage(Collaborators);

impl PipelineStage for DataIngestionStage {
    fn name(&self) -> StageName {
        StageName::DataIngestion
    }

    fn run(&self, resolver: &ConfigResolver) -> Result<()> {
        let config = resolver.resolve_data_ingestion_config()?;
        DataIngestion::new(config, self.0.fetcher.clone(), self.0.extractor.clone()).run()
    }
}

struct PrepareBaseModelStage(Collaborators);

impl PipelineStage for PrepareBaseModelStage {
    fn name(&self) -> StageName {
        StageName::PrepareBaseModel
    }

    fn run(&self, resolver: &ConfigResolver) -> Result<()> {
        let config = resolver.resolve_base_model_config()?;
        PrepareBaseModel::new(config, self.0.backend.clone()).run()
    }
}

struct ModelTrainerStage(Collaborators);

impl PipelineStage for ModelTrainerStage {
    fn name(&self) -> StageName {
        StageName::ModelTrainer
    }

    fn run(&self, resolver: &ConfigResolver) -> Result<()> {
        let config = resolver.resolve_model_trainer_config()?;
        let trainer = ModelTrainer::new(config, self.0.backend.clone());
        match self.0.training_seed {
            Some(seed) => trainer.with_seed(seed).run(),
            None => trainer.run(),
        }
    }
}

struct ModelEvaluationStage(Collaborators);

impl PipelineStage for ModelEvaluationStage {
    fn name(&self) -> StageName {
        StageName::ModelEvaluation
    }

    fn run(&self, resolver: &ConfigResolver) -> Result<()> {
        let config = resolver.resolve_model_evaluation_config()?;
        let tracker = (self.0.tracking)(&config.mlflow_uri)?;
        ModelEvaluation::new(config, self.0.backend.clone()).run(tracker.as_ref())?;
        Ok(())
    }
}

/// Ordered, fail-fast stage runner
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// The four stages in their fixed order
    pub fn standard(collaborators: Collaborators) -> Self {
        Self::new(vec![
            Box::new(DataIngestionStage(collaborators.clone())),
            Box::new(PrepareBaseModelStage(collaborators.clone())),
            Box::new(ModelTrainerStage(collaborators.clone())),
            Box::new(ModelEvaluationStage(collaborators)),
        ])
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order; stops at the first failure
    pub fn run(&self, resolver: &ConfigResolver) -> Result<()> {
        let started = Instant::now();
        for stage in &self.stages {
            execute(stage.as_ref(), resolver)?;
        }
        info!(
            stages = self.stages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline completed"
        );
        Ok(())
    }

    /// Run a single stage by name
    pub fn run_stage(&self, name: StageName, resolver: &ConfigResolver) -> Result<()> {
        let stage = self
            .stages
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::InvalidInput(format!("stage {} is not part of this pipeline", name)))?;
        execute(stage.as_ref(), resolver)
    }
}

fn execute(stage: &dyn PipelineStage, resolver: &ConfigResolver) -> Result<()> {
    let name = stage.name();
    info!(stage = %name, ">>>>>> {} started <<<<<<", name.label());
    let started = Instant::now();

    match stage.run(resolver) {
        Ok(()) => {
            info!(
                stage = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ">>>>>> {} completed <<<<<<",
                name.label()
            );
            Ok(())
        }
        Err(e) => {
            error!(stage = %name, "{} failed: {}", name.label(), e);
            Err(e)
        }
    }
}
