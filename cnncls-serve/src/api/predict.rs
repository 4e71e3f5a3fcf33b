//! Prediction endpoint
//!
//! POST /predict with `{"image": "<base64>"}`; answers `[{"image": "<label>"}]`.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::inference::Prediction;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub image: String,
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<Prediction>>> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let service = state.prediction.clone();
    let outcome = tokio::task::spawn_blocking(move || service.predict(&request.image)).await?;

    match outcome {
        Ok(predictions) => Ok(Json(predictions)),
        Err(e) => {
            error!("Prediction failed: {}", e);
            state.record_error(format!("prediction: {}", e)).await;
            Err(e.into())
        }
    }
}

/// Build prediction routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/predict", post(predict))
}
