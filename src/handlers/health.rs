use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::telemetry::ResourceQueryError;

/// Handle GET /
pub async fn root() -> impl IntoResponse {
    info!("Root endpoint accessed");
    Json(json!({
        "message": "Titanic Survival Prediction API",
        "status": "running",
    }))
}

/// Handle GET /health
///
/// Always 200; a failing host query degrades the status instead.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.host.clone();
    let usage = tokio::task::spawn_blocking(move || -> Result<_, ResourceQueryError> {
        Ok((host.cpu_percent()?, host.memory_percent()?, host.disk_percent()?))
    })
    .await;

    let body = match usage {
        Ok(Ok((cpu, memory, disk))) => {
            info!(cpu_usage = cpu, memory_usage = memory, disk_usage = disk, "Health check");
            json!({
                "status": "healthy",
                "timestamp": Utc::now(),
                "service": state.service_name,
                "version": env!("CARGO_PKG_VERSION"),
                "system": {
                    "cpu_usage": format!("{:.1}%", cpu),
                    "memory_usage": format!("{:.1}%", memory),
                    "disk_usage": format!("{:.1}%", disk),
                }
            })
        }
        Ok(Err(e)) => degraded(&e.to_string()),
        Err(e) => degraded(&e.to_string()),
    };

    (StatusCode::OK, Json(body))
}

fn degraded(reason: &str) -> serde_json::Value {
    error!(error = reason, "Health check degraded");
    json!({
        "status": "degraded",
        "timestamp": Utc::now(),
        "error": reason,
    })
}
