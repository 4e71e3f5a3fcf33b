//! Experiment tracking
//!
//! **Responsibilities:**
//! - Classify a tracking URI as a local file store or a remote server
//! - Record runs: parameters, metrics, model artifacts, final status
//!
//! Model registration is only meaningful against a remote server; the file
//! store logs models without registering them.

mod file_store;
mod rest;

pub use file_store::FileTracker;
pub use rest::MlflowRestClient;

use cnncls_common::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where tracking data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingStore {
    /// `file:` URI or bare path
    Local(PathBuf),
    /// Any URI with a non-`file` scheme
    Remote(String),
}

impl TrackingStore {
    pub fn from_uri(uri: &str) -> Self {
        if let Some(rest) = uri.strip_prefix("file:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            return TrackingStore::Local(PathBuf::from(path));
        }
        match uri.split_once("://") {
            Some((scheme, _)) if !scheme.is_empty() => TrackingStore::Remote(uri.to_string()),
            _ => TrackingStore::Local(PathBuf::from(uri)),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TrackingStore::Local(_))
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Identity of an active run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub artifact_uri: String,
}

pub trait TrackingClient: Send + Sync {
    fn store(&self) -> &TrackingStore;

    fn start_run(&self) -> Result<RunInfo>;

    fn log_params(&self, run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metrics(&self, run: &RunInfo, metrics: &BTreeMap<String, f64>) -> Result<()>;

    /// Store `model_file` under the run's `model` artifact path, registering it
    /// under `registered_name` when given
    fn log_model(&self, run: &RunInfo, model_file: &Path, registered_name: Option<&str>) -> Result<()>;

    fn end_run(&self, run: &RunInfo, status: RunStatus) -> Result<()>;
}

/// Build the client matching `uri`
pub fn connect(uri: &str) -> Result<Box<dyn TrackingClient>> {
    match TrackingStore::from_uri(uri) {
        TrackingStore::Local(root) => Ok(Box::new(FileTracker::new(root))),
        TrackingStore::Remote(base) => Ok(Box::new(MlflowRestClient::from_env(&base)?)),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
