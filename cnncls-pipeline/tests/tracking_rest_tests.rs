//! Remote tracking client tests against a local stub server

mod helpers;

use cnncls_pipeline::services::{ArchiveFetcher, HttpFetcher, MlflowRestClient, RunStatus, TrackingClient};
use helpers::http_stub::RecordedRequest;
use helpers::StubServer;
use serial_test::serial;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn mlflow_responder(request: &RecordedRequest) -> (u16, String) {
    match request.path.as_str() {
        "/api/2.0/mlflow/runs/create" => (
            200,
            r#"{"run":{"info":{"run_id":"r1","experiment_id":"0","artifact_uri":"mlflow-artifacts:/0/r1/artifacts"}}}"#
                .to_string(),
        ),
        "/api/2.0/mlflow/registered-models/create" => (
            400,
            r#"{"error_code":"RESOURCE_ALREADY_EXISTS","message":"Registered Model (name=VGG16Model) already exists."}"#
                .to_string(),
        ),
        "/api/2.0/mlflow/model-versions/create" => {
            (200, r#"{"model_version":{"name":"VGG16Model","version":"3"}}"#.to_string())
        }
        _ => (200, "{}".to_string()),
    }
}

fn model_file(temp: &TempDir) -> std::path::PathBuf {
    let path = temp.path().join("model.json");
    std::fs::write(&path, br#"{"name":"vgg16"}"#).unwrap();
    path
}

#[test]
#[serial]
fn test_full_run_request_sequence() {
    std::env::remove_var("MLFLOW_TRACKING_TOKEN");
    std::env::remove_var("MLFLOW_TRACKING_USERNAME");
    std::env::remove_var("MLFLOW_EXPERIMENT_ID");

    let temp = TempDir::new().unwrap();
    let server = StubServer::start(mlflow_responder);
    let client = MlflowRestClient::from_env(&server.base_url).unwrap();
    assert!(!client.store().is_local());

    let run = client.start_run().unwrap();
    assert_eq!(run.run_id, "r1");

    let mut params = BTreeMap::new();
    params.insert("EPOCHS".to_string(), "1".to_string());
    client.log_params(&run, &params).unwrap();

    let mut metrics = BTreeMap::new();
    metrics.insert("loss".to_string(), 0.25);
    metrics.insert("accuracy".to_string(), 0.75);
    client.log_metrics(&run, &metrics).unwrap();

    client
        .log_model(&run, &model_file(&temp), Some("VGG16Model"))
        .unwrap();
    client.end_run(&run, RunStatus::Finished).unwrap();

    assert_eq!(
        server.paths(),
        vec![
            "POST /api/2.0/mlflow/runs/create",
            "POST /api/2.0/mlflow/runs/log-batch",
            "POST /api/2.0/mlflow/runs/log-batch",
            "PUT /api/2.0/mlflow-artifacts/artifacts/0/r1/artifacts/model/model.json",
            "POST /api/2.0/mlflow/registered-models/create",
            "POST /api/2.0/mlflow/model-versions/create",
            "POST /api/2.0/mlflow/runs/update",
        ]
    );

    let requests = server.requests();
    assert_eq!(requests[1].json()["params"][0]["key"], "EPOCHS");
    assert_eq!(requests[2].json()["metrics"].as_array().unwrap().len(), 2);
    assert_eq!(requests[3].body, br#"{"name":"vgg16"}"#.to_vec());
    assert_eq!(requests[5].json()["source"], "mlflow-artifacts:/0/r1/artifacts/model");
    assert_eq!(requests[6].json()["status"], "FINISHED");
    assert!(requests.iter().all(|r| r.authorization.is_none()));
}

#[test]
#[serial]
fn test_token_is_sent_as_bearer() {
    std::env::remove_var("MLFLOW_TRACKING_USERNAME");
    std::env::set_var("MLFLOW_TRACKING_TOKEN", "s3cret");

    let server = StubServer::start(mlflow_responder);
    let client = MlflowRestClient::from_env(&server.base_url).unwrap();
    let run = client.start_run().unwrap();
    client.end_run(&run, RunStatus::Failed).unwrap();

    std::env::remove_var("MLFLOW_TRACKING_TOKEN");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer s3cret")));
    assert_eq!(requests[1].json()["status"], "FAILED");
}

#[test]
#[serial]
fn test_server_error_is_backend_error() {
    std::env::remove_var("MLFLOW_TRACKING_TOKEN");
    std::env::remove_var("MLFLOW_TRACKING_USERNAME");

    let server = StubServer::start(|_| (500, r#"{"error_code":"INTERNAL_ERROR"}"#.to_string()));
    let client = MlflowRestClient::from_env(&server.base_url).unwrap();

    let err = client.start_run().unwrap_err();
    assert!(matches!(err, cnncls_common::Error::Backend(_)));
    assert!(err.to_string().contains("INTERNAL_ERROR"));
}

#[test]
fn test_http_fetcher_writes_response_body() {
    let temp = TempDir::new().unwrap();
    let server = StubServer::start(|_| (200, "PK-archive-bytes".to_string()));
    let destination = temp.path().join("nested/data.zip");

    let written = HttpFetcher::new()
        .unwrap()
        .fetch(&format!("{}/uc?export=download&id=abc", server.base_url), &destination)
        .unwrap();

    assert_eq!(written, 16);
    assert_eq!(std::fs::read(&destination).unwrap(), b"PK-archive-bytes");
    assert_eq!(server.paths(), vec!["GET /uc?export=download&id=abc"]);
}

#[test]
fn test_http_fetcher_rejects_error_status() {
    let temp = TempDir::new().unwrap();
    let server = StubServer::start(|_| (404, "missing".to_string()));

    let result = HttpFetcher::new()
        .unwrap()
        .fetch(&format!("{}/uc?id=gone", server.base_url), &temp.path().join("data.zip"));

    assert!(result.is_err());
}
