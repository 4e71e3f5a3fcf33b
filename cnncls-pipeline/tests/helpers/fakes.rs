//! In-process collaborator doubles

use cnncls_common::entity::ImageSize;
use cnncls_common::{Error, Result};
use cnncls_pipeline::backend::{
    CompileOptions, FitPlan, Fitted, Model, ModelBackend, PretrainedSpec, Score,
};
use cnncls_pipeline::data::{BatchSource, ImageTensor};
use cnncls_pipeline::services::{ArchiveFetcher, RunInfo, RunStatus, TrackingClient, TrackingStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serves a local archive for any URL, recording requested URLs
pub struct LocalFetcher {
    archive: PathBuf,
    pub requested: Mutex<Vec<String>>,
}

impl LocalFetcher {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl ArchiveFetcher for LocalFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        self.requested.lock().unwrap().push(url.to_string());
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::copy(&self.archive, destination)?)
    }
}

/// Always fails, like an unreachable host
pub struct FailingFetcher;

impl ArchiveFetcher for FailingFetcher {
    fn fetch(&self, url: &str, _destination: &Path) -> Result<u64> {
        Err(Error::backend(format!("download request to {} failed: connection refused", url)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    StartRun,
    LogParams(usize),
    LogMetrics(BTreeMap<String, String>),
    LogModel { registered_name: Option<String> },
    EndRun(RunStatus),
}

/// Tracking client with a fixed run id that records every call
pub struct RecordingTracker {
    store: TrackingStore,
    run_id: String,
    fail_log_model: bool,
    pub calls: Mutex<Vec<TrackerCall>>,
}

impl RecordingTracker {
    pub fn local(run_id: &str) -> Self {
        Self::with_store(TrackingStore::Local(PathBuf::from("mlruns")), run_id)
    }

    pub fn remote(run_id: &str) -> Self {
        Self::with_store(
            TrackingStore::Remote("https://dagshub.com/user/repo.mlflow".to_string()),
            run_id,
        )
    }

    fn with_store(store: TrackingStore, run_id: &str) -> Self {
        Self {
            store,
            run_id: run_id.to_string(),
            fail_log_model: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_model_upload(mut self) -> Self {
        self.fail_log_model = true;
        self
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: TrackerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TrackingClient for RecordingTracker {
    fn store(&self) -> &TrackingStore {
        &self.store
    }

    fn start_run(&self) -> Result<RunInfo> {
        self.push(TrackerCall::StartRun);
        Ok(RunInfo {
            run_id: self.run_id.clone(),
            experiment_id: "0".to_string(),
            artifact_uri: format!("mlflow-artifacts:/0/{}/artifacts", self.run_id),
        })
    }

    fn log_params(&self, _run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()> {
        self.push(TrackerCall::LogParams(params.len()));
        Ok(())
    }

    fn log_metrics(&self, _run: &RunInfo, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let rendered = metrics.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        self.push(TrackerCall::LogMetrics(rendered));
        Ok(())
    }

    fn log_model(&self, _run: &RunInfo, _model_file: &Path, registered_name: Option<&str>) -> Result<()> {
        self.push(TrackerCall::LogModel {
            registered_name: registered_name.map(str::to_string),
        });
        if self.fail_log_model {
            return Err(Error::backend("artifact upload returned 503 Service Unavailable"));
        }
        Ok(())
    }

    fn end_run(&self, _run: &RunInfo, status: RunStatus) -> Result<()> {
        self.push(TrackerCall::EndRun(status));
        Ok(())
    }
}

/// Backend that records every `FitPlan` it is handed and fits nothing
#[derive(Default)]
pub struct PlanRecordingBackend {
    pub plans: Mutex<Vec<FitPlan>>,
}

impl ModelBackend for PlanRecordingBackend {
    fn name(&self) -> &'static str {
        "plan-recording"
    }

    fn pretrained(&self, _spec: &PretrainedSpec) -> Result<Model> {
        Err(Error::backend("not supported"))
    }

    fn compile(&self, model: Model, _options: CompileOptions) -> Result<Model> {
        Ok(model)
    }

    fn load(&self, _path: &Path) -> Result<Model> {
        Ok(Model::new("recorded", ImageSize::new(8, 8, 3), Vec::new()).with_classifier_head(2))
    }

    fn save(&self, _path: &Path, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn fit(
        &self,
        model: Model,
        _train: &mut dyn BatchSource,
        _validation: &mut dyn BatchSource,
        plan: &FitPlan,
    ) -> Result<Fitted> {
        self.plans.lock().unwrap().push(*plan);
        Ok(Fitted {
            model,
            history: Vec::new(),
        })
    }

    fn evaluate(&self, _model: &Model, _data: &mut dyn BatchSource) -> Result<Score> {
        Err(Error::backend("not supported"))
    }

    fn predict(&self, _model: &Model, _input: &ImageTensor) -> Result<Vec<f32>> {
        Err(Error::backend("not supported"))
    }
}
