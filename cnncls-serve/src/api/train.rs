//! Training trigger endpoint
//!
//! GET or POST /train runs the full pipeline in-process. Only one run may be
//! active; a second trigger is rejected with 409 until the first finishes.

use axum::{extract::State, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const TRAINING_COMPLETED: &str = "Training completed successfully";

/// Clears the active-training flag when the run ends, whatever the outcome.
///
/// Owned by the blocking job, so the flag stays set even if the request
/// that started the run is dropped.
struct ActiveTraining(Arc<AtomicBool>);

impl ActiveTraining {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for ActiveTraining {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// GET|POST /train
pub async fn train(State(state): State<AppState>) -> ApiResult<&'static str> {
    let active = ActiveTraining::acquire(&state.training)
        .ok_or_else(|| ApiError::Conflict("Training already running".to_string()))?;

    info!("Training triggered over HTTP");
    let runner = state.trainer.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _active = active;
        runner()
    })
    .await?;

    match outcome {
        Ok(()) => {
            info!("Training finished");
            Ok(TRAINING_COMPLETED)
        }
        Err(e) => {
            error!("Training failed: {}", e);
            state.record_error(format!("training: {}", e)).await;
            Err(e.into())
        }
    }
}

/// Build training routes
pub fn train_routes() -> Router<AppState> {
    Router::new().route("/train", get(train).post(train))
}
