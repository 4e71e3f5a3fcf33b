//! HTTP API integration tests
//!
//! Router-level tests driven through `tower::ServiceExt::oneshot` with a fake
//! model backend and an in-process training runner.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cnncls_common::entity::ImageSize;
use cnncls_common::{Error, Result};
use cnncls_pipeline::backend::{
    CompileOptions, FitPlan, Fitted, Model, ModelBackend, NativeBackend, PretrainedSpec, Score,
};
use cnncls_pipeline::data::{BatchSource, ImageTensor};
use cnncls_serve::inference::encode_image;
use cnncls_serve::{build_router, AppState, PredictionService, TrainingRunner};
use http_body_util::BodyExt;
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Backend that answers every prediction with fixed class scores
struct FixedBackend {
    scores: Vec<f32>,
    loads: AtomicUsize,
    last_input: std::sync::Mutex<Option<(u32, u32, u32)>>,
}

impl FixedBackend {
    fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            loads: AtomicUsize::new(0),
            last_input: std::sync::Mutex::new(None),
        }
    }
}

impl ModelBackend for FixedBackend {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn pretrained(&self, _spec: &PretrainedSpec) -> Result<Model> {
        Err(Error::backend("not supported"))
    }

    fn compile(&self, model: Model, _options: CompileOptions) -> Result<Model> {
        Ok(model)
    }

    fn load(&self, _path: &Path) -> Result<Model> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Model::new("fixed", ImageSize::new(224, 224, 3), Vec::new()).with_classifier_head(2))
    }

    fn save(&self, _path: &Path, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn fit(
        &self,
        _model: Model,
        _train: &mut dyn BatchSource,
        _validation: &mut dyn BatchSource,
        _plan: &FitPlan,
    ) -> Result<Fitted> {
        Err(Error::backend("not supported"))
    }

    fn evaluate(&self, _model: &Model, _data: &mut dyn BatchSource) -> Result<Score> {
        Err(Error::backend("not supported"))
    }

    fn predict(&self, _model: &Model, input: &ImageTensor) -> Result<Vec<f32>> {
        *self.last_input.lock().unwrap() = Some((input.height, input.width, input.channels));
        Ok(self.scores.clone())
    }
}

fn png_base64() -> String {
    let img = RgbImage::from_pixel(6, 4, Rgb([120, 130, 140]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    encode_image(&buf.into_inner())
}

fn succeed() -> TrainingRunner {
    Arc::new(|| -> Result<()> { Ok(()) })
}

fn state_with(backend: Arc<dyn ModelBackend>, trainer: TrainingRunner) -> AppState {
    AppState::new(PredictionService::new(backend, "model/model.json"), trainer)
}

fn predict_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_predict_index_one_is_normal() {
    let backend = Arc::new(FixedBackend::new(vec![0.1, 0.9]));
    let app = build_router(state_with(backend.clone(), succeed()));

    let response = app
        .oneshot(predict_request(json!({ "image": png_base64() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([{ "image": "Normal" }]));
    assert_eq!(*backend.last_input.lock().unwrap(), Some((224, 224, 3)));
}

#[tokio::test]
async fn test_predict_other_index_is_cancer() {
    let backend = Arc::new(FixedBackend::new(vec![0.7, 0.3]));
    let app = build_router(state_with(backend, succeed()));

    let response = app
        .oneshot(predict_request(json!({ "image": png_base64() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!([{ "image": "Adenocarcinoma Cancer" }])
    );
}

#[tokio::test]
async fn test_model_is_loaded_once() {
    let backend = Arc::new(FixedBackend::new(vec![0.1, 0.9]));
    let app = build_router(state_with(backend.clone(), succeed()));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(predict_request(json!({ "image": png_base64() })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_base64_is_bad_request() {
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), succeed()));

    let response = app
        .oneshot(predict_request(json!({ "image": "***" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_undecodable_image_is_bad_request() {
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), succeed()));

    let response = app
        .oneshot(predict_request(json!({ "image": encode_image(b"plain text") })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_image_field_is_bad_request() {
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), succeed()));

    let response = app
        .oneshot(predict_request(json!({ "picture": "abc" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_model_file_is_reported() {
    let temp = tempfile::TempDir::new().unwrap();
    let state = AppState::new(
        PredictionService::new(
            Arc::new(NativeBackend::new()),
            temp.path().join("model_trainer/model.json"),
        ),
        succeed(),
    );
    let app = build_router(state.clone());

    let response = app
        .clone()
        .oneshot(predict_request(json!({ "image": png_base64() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["code"], "ARTIFACT_ERROR");
    assert!(state.last_error.read().await.is_some());
}

#[tokio::test]
async fn test_train_runs_pipeline_via_get_and_post() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let trainer: TrainingRunner = Arc::new(move || -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), trainer));

    for method in ["GET", "POST"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/train")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Training completed successfully");
    }

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_train_rejected_while_running() {
    let state = state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), succeed());
    state.training.store(true, Ordering::SeqCst);
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/train").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_failed_training_surfaces_in_health() {
    let trainer: TrainingRunner = Arc::new(|| -> Result<()> {
        Err(Error::artifact_not_found("artifacts/data_ingestion", "missing"))
    });
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), trainer));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/train").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body = body_json(health).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "cnncls-serve");
    assert_eq!(body["training_active"], false);
    assert!(body["last_error"].as_str().unwrap().starts_with("training:"));
}

#[tokio::test]
async fn test_health_before_any_request() {
    let app = build_router(state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), succeed()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["model_loaded"], false);
    assert!(body.get("last_error").is_none());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_train_stays_exclusive_after_request_is_dropped() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_in, peak_in) = (active.clone(), peak.clone());
    let trainer: TrainingRunner = Arc::new(move || -> Result<()> {
        let now = active_in.fetch_add(1, Ordering::SeqCst) + 1;
        peak_in.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(400));
        active_in.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });
    let state = state_with(Arc::new(FixedBackend::new(vec![1.0, 0.0])), trainer);
    let app = build_router(state.clone());

    let first = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        app.clone()
            .oneshot(Request::builder().uri("/train").body(Body::empty()).unwrap()),
    )
    .await;
    assert!(first.is_err(), "first request should still be running");
    assert!(state.training.load(Ordering::SeqCst));

    let second = app
        .clone()
        .oneshot(Request::builder().uri("/train").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    for _ in 0..100 {
        if !state.training.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!state.training.load(Ordering::SeqCst));
    assert_eq!(peak.load(Ordering::SeqCst), 1);

    let third = app
        .oneshot(Request::builder().uri("/train").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::OK);
}
