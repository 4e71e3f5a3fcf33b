//! Local file-store tracker
//!
//! Layout under the store root:
//! `<experiment>/<run_id>/{meta.yaml, params/<key>, metrics/<key>, artifacts/model/}`

use super::{now_millis, RunInfo, RunStatus, TrackingClient, TrackingStore};
use cnncls_common::fs::ensure_directories;
use cnncls_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DEFAULT_EXPERIMENT_ID: &str = "0";

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    experiment_id: String,
    name: String,
    artifact_location: String,
    lifecycle_stage: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMeta {
    run_id: String,
    experiment_id: String,
    status: String,
    start_time: i64,
    end_time: Option<i64>,
    artifact_uri: String,
    lifecycle_stage: String,
}

#[derive(Debug, Serialize)]
struct ModelDescriptor<'a> {
    artifact_path: &'a str,
    run_id: &'a str,
    model_file: String,
    utc_time_created: String,
}

pub struct FileTracker {
    store: TrackingStore,
    root: PathBuf,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            store: TrackingStore::Local(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run: &RunInfo) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }

    fn ensure_experiment(&self) -> Result<PathBuf> {
        let dir = self.root.join(DEFAULT_EXPERIMENT_ID);
        let meta_path = dir.join("meta.yaml");
        if !meta_path.exists() {
            ensure_directories(&[&dir])?;
            let meta = ExperimentMeta {
                experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
                name: "Default".to_string(),
                artifact_location: dir.display().to_string(),
                lifecycle_stage: "active".to_string(),
            };
            write_yaml(&meta_path, &meta)?;
        }
        Ok(dir)
    }

    fn read_meta(&self, run: &RunInfo) -> Result<RunMeta> {
        let path = self.run_dir(run).join("meta.yaml");
        if !path.exists() {
            return Err(Error::artifact_not_found(&path, "run metadata missing"));
        }
        let content = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::backend(format!("corrupt run metadata {}: {}", path.display(), e)))
    }
}

impl TrackingClient for FileTracker {
    fn store(&self) -> &TrackingStore {
        &self.store
    }

    fn start_run(&self) -> Result<RunInfo> {
        let experiment_dir = self.ensure_experiment()?;
        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = experiment_dir.join(&run_id);
        let artifacts = run_dir.join("artifacts");
        ensure_directories(&[
            run_dir.join("params"),
            run_dir.join("metrics"),
            run_dir.join("tags"),
            artifacts.clone(),
        ])?;

        let meta = RunMeta {
            run_id: run_id.clone(),
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            status: "RUNNING".to_string(),
            start_time: now_millis(),
            end_time: None,
            artifact_uri: artifacts.display().to_string(),
            lifecycle_stage: "active".to_string(),
        };
        write_yaml(&run_dir.join("meta.yaml"), &meta)?;

        tracing::info!(run_id = %run_id, store = %self.root.display(), "Tracking run started");
        Ok(RunInfo {
            run_id,
            experiment_id: meta.experiment_id,
            artifact_uri: meta.artifact_uri,
        })
    }

    fn log_params(&self, run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()> {
        let dir = self.run_dir(run).join("params");
        for (key, value) in params {
            std::fs::write(dir.join(key), value)?;
        }
        Ok(())
    }

    fn log_metrics(&self, run: &RunInfo, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let dir = self.run_dir(run).join("metrics");
        let timestamp = now_millis();
        for (key, value) in metrics {
            let mut file = OpenOptions::new().create(true).append(true).open(dir.join(key))?;
            writeln!(file, "{} {} 0", timestamp, value)?;
        }
        Ok(())
    }

    fn log_model(&self, run: &RunInfo, model_file: &Path, registered_name: Option<&str>) -> Result<()> {
        if let Some(name) = registered_name {
            tracing::warn!(model = name, "Model registry is unavailable on a file store; logging without registration");
        }
        let file_name = model_file
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", model_file.display())))?;
        if !model_file.is_file() {
            return Err(Error::artifact_not_found(model_file, "model file does not exist"));
        }

        let dest = self.run_dir(run).join("artifacts").join("model");
        ensure_directories(&[&dest])?;
        std::fs::copy(model_file, dest.join(file_name))?;

        let descriptor = ModelDescriptor {
            artifact_path: "model",
            run_id: &run.run_id,
            model_file: file_name.to_string_lossy().into_owned(),
            utc_time_created: chrono::Utc::now().to_rfc3339(),
        };
        write_yaml(&dest.join("MLmodel"), &descriptor)
    }

    fn end_run(&self, run: &RunInfo, status: RunStatus) -> Result<()> {
        let mut meta = self.read_meta(run)?;
        meta.status = status.as_str().to_string();
        meta.end_time = Some(now_millis());
        write_yaml(&self.run_dir(run).join("meta.yaml"), &meta)?;
        tracing::info!(run_id = %run.run_id, status = status.as_str(), "Tracking run ended");
        Ok(())
    }
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml::to_string(value)
        .map_err(|e| Error::backend(format!("cannot serialize {}: {}", path.display(), e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
