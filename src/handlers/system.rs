use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use super::AppState;
use crate::error::AppError;
use crate::telemetry::SystemOverview;

#[derive(Debug, Serialize)]
pub struct SystemMetricsResponse {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub overview: SystemOverview,
}

/// Handle GET /metrics/system
pub async fn system_metrics(
    State(state): State<AppState>,
) -> Result<Json<SystemMetricsResponse>, AppError> {
    let host = state.host.clone();
    let overview = tokio::task::spawn_blocking(move || host.overview())
        .await
        .map_err(|e| AppError::Internal(format!("Error collecting metrics: {}", e)))?
        .map_err(|e| {
            error!(error = %e, "Error collecting system metrics");
            AppError::ResourceUnavailable(format!("Error collecting metrics: {}", e))
        })?;

    info!(
        cpu_usage = overview.cpu.usage_percent,
        memory_usage = overview.memory.percent,
        "System metrics collected"
    );

    Ok(Json(SystemMetricsResponse {
        timestamp: Utc::now(),
        overview,
    }))
}
