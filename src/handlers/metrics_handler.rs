use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Handle GET /metrics (Prometheus text exposition)
pub async fn metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::instruments;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_metrics_handler_renders_recorder() {
        let recorder = instruments::build_recorder().unwrap();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || instruments::record_low_confidence());

        let response = metrics(State(Arc::new(handle))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("low_confidence_predictions 1"));
    }
}
