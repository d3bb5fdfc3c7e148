use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use super::AppState;
use crate::error::AppError;
use crate::models::{PredictionRequest, PredictionResponse};

/// Handle POST /predict
///
/// Undecodable bodies are rejected here and never reach the pipeline, so
/// they only show up in the HTTP-level metrics.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let Json(request) = payload?;
    let outcome = state.pipeline.predict(&request)?;
    Ok(Json(PredictionResponse::from(&outcome)))
}
