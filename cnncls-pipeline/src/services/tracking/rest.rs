//! MLflow tracking server client (REST API 2.0)
//!
//! Credentials come from `MLFLOW_TRACKING_USERNAME` / `MLFLOW_TRACKING_PASSWORD`
//! (basic auth) or `MLFLOW_TRACKING_TOKEN` (bearer). The experiment defaults to
//! `0` unless `MLFLOW_EXPERIMENT_ID` is set. Artifacts are uploaded through the
//! server's `mlflow-artifacts` proxy.

use super::{now_millis, RunInfo, RunStatus, TrackingClient, TrackingStore};
use cnncls_common::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

const PROXY_SCHEME: &str = "mlflow-artifacts:/";

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

pub struct MlflowRestClient {
    store: TrackingStore,
    base_url: String,
    experiment_id: String,
    auth: Auth,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunEnvelope,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    info: RunInfoBody,
}

#[derive(Debug, Deserialize)]
struct RunInfoBody {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: String,
}

impl MlflowRestClient {
    pub fn new(base_url: &str, experiment_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::backend(format!("failed to create HTTP client: {}", e)))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            store: TrackingStore::Remote(base_url.clone()),
            base_url,
            experiment_id: experiment_id.into(),
            auth: Auth::None,
            client,
        })
    }

    /// Client configured from the `MLFLOW_*` environment variables
    pub fn from_env(base_url: &str) -> Result<Self> {
        let experiment_id = std::env::var("MLFLOW_EXPERIMENT_ID").unwrap_or_else(|_| "0".to_string());
        let mut client = Self::new(base_url, experiment_id)?;
        if let Ok(token) = std::env::var("MLFLOW_TRACKING_TOKEN") {
            client.auth = Auth::Bearer(token);
        } else if let Ok(username) = std::env::var("MLFLOW_TRACKING_USERNAME") {
            let password = std::env::var("MLFLOW_TRACKING_PASSWORD").unwrap_or_default();
            client.auth = Auth::Basic { username, password };
        }
        Ok(client)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .authorize(self.client.post(self.endpoint(path)).json(body))
            .send()
            .map_err(|e| Error::backend(format!("MLflow {} request failed: {}", path, e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::backend(format!("MLflow {} response unreadable: {}", path, e)))?;
        if !status.is_success() {
            return Err(Error::backend(format!("MLflow {} returned {}: {}", path, status, text)));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Artifact path relative to the proxy root, e.g. `0/<run>/artifacts`
    fn artifact_root(&self, run: &RunInfo) -> String {
        match run.artifact_uri.strip_prefix(PROXY_SCHEME) {
            Some(rest) => rest.trim_matches('/').to_string(),
            None => format!("{}/{}/artifacts", run.experiment_id, run.run_id),
        }
    }

    fn upload_artifact(&self, run: &RunInfo, relative: &str, file: &Path) -> Result<()> {
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.base_url,
            self.artifact_root(run),
            relative
        );
        let bytes = std::fs::read(file)?;
        let response = self
            .authorize(self.client.put(&url).body(bytes))
            .send()
            .map_err(|e| Error::backend(format!("artifact upload to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::backend(format!(
                "artifact upload to {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    fn register(&self, run: &RunInfo, name: &str) -> Result<()> {
        match self.post("registered-models/create", &json!({ "name": name })) {
            Ok(_) => {}
            Err(Error::Backend(msg)) if msg.contains("RESOURCE_ALREADY_EXISTS") => {
                tracing::debug!(model = name, "Registered model already exists");
            }
            Err(e) => return Err(e),
        }

        let source = if run.artifact_uri.is_empty() {
            format!("runs:/{}/model", run.run_id)
        } else {
            format!("{}/model", run.artifact_uri.trim_end_matches('/'))
        };
        let response = self.post(
            "model-versions/create",
            &json!({ "name": name, "source": source, "run_id": run.run_id }),
        )?;
        let version = response["model_version"]["version"].as_str().unwrap_or("?");
        tracing::info!(model = name, version, "Model version registered");
        Ok(())
    }
}

impl TrackingClient for MlflowRestClient {
    fn store(&self) -> &TrackingStore {
        &self.store
    }

    fn start_run(&self) -> Result<RunInfo> {
        let body = json!({
            "experiment_id": self.experiment_id,
            "start_time": now_millis(),
        });
        let response: CreateRunResponse = serde_json::from_value(self.post("runs/create", &body)?)?;
        let info = response.run.info;
        tracing::info!(run_id = %info.run_id, server = %self.base_url, "Tracking run started");
        Ok(RunInfo {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
        })
    }

    fn log_params(&self, run: &RunInfo, params: &BTreeMap<String, String>) -> Result<()> {
        let params: Vec<Value> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        self.post("runs/log-batch", &json!({ "run_id": run.run_id, "params": params }))?;
        Ok(())
    }

    fn log_metrics(&self, run: &RunInfo, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let timestamp = now_millis();
        let metrics: Vec<Value> = metrics
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": timestamp, "step": 0 }))
            .collect();
        self.post("runs/log-batch", &json!({ "run_id": run.run_id, "metrics": metrics }))?;
        Ok(())
    }

    fn log_model(&self, run: &RunInfo, model_file: &Path, registered_name: Option<&str>) -> Result<()> {
        let file_name = model_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", model_file.display())))?;
        if !model_file.is_file() {
            return Err(Error::artifact_not_found(model_file, "model file does not exist"));
        }

        self.upload_artifact(run, &format!("model/{}", file_name), model_file)?;
        if let Some(name) = registered_name {
            self.register(run, name)?;
        }
        Ok(())
    }

    fn end_run(&self, run: &RunInfo, status: RunStatus) -> Result<()> {
        self.post(
            "runs/update",
            &json!({ "run_id": run.run_id, "status": status.as_str(), "end_time": now_millis() }),
        )?;
        tracing::info!(run_id = %run.run_id, status = status.as_str(), "Tracking run ended");
        Ok(())
    }
}
