use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::stats::AlertSnapshot;

/// Handle GET /metrics/alerts
pub async fn alert_metrics(State(state): State<AppState>) -> Json<AlertSnapshot> {
    Json(state.ctx.alert_snapshot(&state.thresholds))
}

/// Handle POST /reset-metrics
pub async fn reset_metrics(State(state): State<AppState>) -> Json<Value> {
    state.ctx.reset();
    info!(event = "metrics_reset", "Metrics reset");
    Json(json!({ "message": "Metrics reset successfully" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state;

    #[tokio::test]
    async fn test_alert_metrics_on_fresh_state() {
        let Json(snapshot) = alert_metrics(State(state())).await;

        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.average_confidence, 1.0);
        assert_eq!(snapshot.alerting_metrics.high_error_rate_alert, 0.0);
        assert_eq!(snapshot.alerting_metrics.low_confidence_alert, 0.0);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let state = state();
        for _ in 0..12 {
            state.ctx.ticket().fail();
        }
        let Json(before) = alert_metrics(State(state.clone())).await;
        assert_eq!(before.alerting_metrics.high_error_rate_alert, 1.0);

        let Json(body) = reset_metrics(State(state.clone())).await;
        assert_eq!(body["message"], "Metrics reset successfully");

        let Json(after) = alert_metrics(State(state)).await;
        assert_eq!(after.request_count, 0);
        assert_eq!(after.error_count, 0);
        assert_eq!(after.alerting_metrics.high_error_rate_alert, 0.0);
    }
}
