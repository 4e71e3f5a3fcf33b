//! cnncls-serve library interface
//!
//! Inference and training-trigger HTTP service for the CT-scan classifier.

pub mod api;
pub mod error;
pub mod inference;

pub use crate::error::{ApiError, ApiResult};
pub use crate::inference::{Prediction, PredictionService};

use axum::Router;
use chrono::{DateTime, Utc};
use cnncls_pipeline::Collaborators;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Blocking job behind `/train`
pub type TrainingRunner = Arc<dyn Fn() -> cnncls_common::Result<()> + Send + Sync>;

/// Run the full pipeline from the given configuration sources with production collaborators
pub fn pipeline_runner(config_path: PathBuf, params_path: PathBuf) -> TrainingRunner {
    Arc::new(move || {
        let collaborators = Collaborators::production()?;
        cnncls_pipeline::run_pipeline(&config_path, &params_path, collaborators)
    })
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub prediction: Arc<PredictionService>,
    pub trainer: TrainingRunner,
    /// Set while a `/train` request is running the pipeline
    pub training: Arc<AtomicBool>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(prediction: PredictionService, trainer: TrainingRunner) -> Self {
        Self {
            prediction: Arc::new(prediction),
            trainer,
            training: Arc::new(AtomicBool::new(false)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::predict_routes())
        .merge(api::train_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
