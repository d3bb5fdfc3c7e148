//! Fault-injection endpoints for exercising alerts and latency dashboards

use axum::{extract::State, response::Json};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info_span, warn, Instrument};

use super::AppState;
use crate::error::AppError;

/// Handle GET /simulate_error
///
/// Counts as one failed request (request and error) and answers 500.
pub async fn simulate_error(State(state): State<AppState>) -> AppError {
    let _span = info_span!("simulate_error", error.simulated = true).entered();
    state.ctx.ticket().fail();
    error!(event = "simulated_error", "Simulated error endpoint called");
    AppError::Internal("This is a simulated error for testing".to_string())
}

/// Handle GET /simulate_slow
pub async fn simulate_slow() -> Json<Value> {
    let sleep_secs = rand::thread_rng().gen_range(2.0..5.0);
    slow_response(Duration::from_secs_f64(sleep_secs)).await
}

async fn slow_response(delay: Duration) -> Json<Value> {
    let secs = delay.as_secs_f64();
    async move {
        warn!(sleep_time = secs, "Simulating slow response");
        tokio::time::sleep(delay).await;
    }
    .instrument(info_span!("simulate_slow", sleep_time = secs))
    .await;

    Json(json!({ "message": format!("Slow response after {:.2} seconds", secs) }))
}
