/// Integration tests for the metric and span export paths
use async_trait::async_trait;
use axum::{body::Body, http::{Request, StatusCode}};
use httpmock::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use titanic_api::{
    config::Config,
    models::PredictionRequest,
    server::{build_app, build_exporter, build_state},
    telemetry::{
        instruments, trace::SpanBatch, ExportError, ResourceAttributes, SpanExportLayer,
        SpanRecord, SpanSink, SpanStatus, TraceExporter,
    },
};
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

fn config_for(endpoint: String) -> Config {
    let mut config = Config::default();
    config.telemetry.collector_endpoint = endpoint;
    config.telemetry.export_timeout_seconds = 2;
    config
}

fn passenger() -> PredictionRequest {
    PredictionRequest {
        pclass: 3,
        sex: "male".to_string(),
        age: 22.0,
        sib_sp: 1,
        parch: 0,
        fare: 7.25,
        embarked: "S".to_string(),
    }
}

#[tokio::test]
async fn test_tick_pushes_service_and_host_gauges() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/metrics");
            then.status(200);
        })
        .await;

    let config = config_for(server.url("/v1/metrics"));
    let state = build_state(&config).unwrap();
    let exporter = build_exporter(&config, &state, None).unwrap();

    state.pipeline.predict(&passenger()).unwrap();

    let report = exporter.tick().await.unwrap();
    assert_eq!(report.points, 12);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_batch_includes_recorder_counters() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/metrics");
            then.status(202);
        })
        .await;

    let recorder = instruments::build_recorder().unwrap();
    let config = config_for(server.url("/v1/metrics"));
    let state = build_state(&config).unwrap();
    let exporter = build_exporter(&config, &state, Some(recorder.handle())).unwrap();

    metrics::with_local_recorder(&recorder, || {
        state.pipeline.predict(&passenger()).unwrap();
    });

    let (batch, _) = exporter.collect().await;
    assert!(batch
        .metrics
        .iter()
        .any(|p| p.name == "predictions_total" && p.value == 1.0));
    assert!(batch
        .metrics
        .iter()
        .any(|p| p.name == "prediction_duration_seconds_bucket"));

    exporter.tick().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_collector_outage_leaves_request_path_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/metrics");
            then.status(503);
        })
        .await;

    let config = config_for(server.url("/v1/metrics"));
    let state = build_state(&config).unwrap();
    let exporter = build_exporter(&config, &state, None).unwrap();

    for _ in 0..3 {
        let err = exporter.tick().await.unwrap_err();
        assert!(matches!(err, ExportError::Rejected { status: 503 }));
    }

    state.pipeline.predict(&passenger()).unwrap();
    assert_eq!(state.ctx.counters().requests_total(), 1);
    assert_eq!(state.ctx.counters().errors_total(), 0);
}

struct CaptureSpans(Mutex<Vec<SpanRecord>>);

#[async_trait]
impl SpanSink for CaptureSpans {
    async fn push_spans(&self, batch: &SpanBatch) -> Result<(), ExportError> {
        self.0.lock().unwrap().extend(batch.spans.iter().cloned());
        Ok(())
    }
}

#[tokio::test]
async fn test_prediction_span_reaches_trace_sink() {
    let (layer, mut queue) = SpanExportLayer::new(64);
    let subscriber = tracing_subscriber::registry().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);

    let state = build_state(&Config::default()).unwrap();
    let handle = instruments::build_recorder().unwrap().handle();
    let app = build_app(state, Arc::new(handle));
    let request = Request::post("/predict")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&passenger()).unwrap()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    drop(guard);

    let mut spans = Vec::new();
    while let Ok(span) = queue.try_recv() {
        spans.push(span);
    }

    let capture = Arc::new(CaptureSpans(Mutex::new(Vec::new())));
    let exporter = TraceExporter::new(
        capture.clone(),
        ResourceAttributes {
            service_name: "titanic-api".to_string(),
            service_version: "1.0.0".to_string(),
        },
        16,
        Duration::from_secs(60),
    );
    exporter.flush(spans).await.unwrap();

    let pushed = capture.0.lock().unwrap();
    let prediction = pushed.iter().find(|s| s.name == "prediction").unwrap();
    let confidence = prediction.attributes["prediction.confidence"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&confidence));
    assert_eq!(prediction.attributes["passenger.pclass"], 3);
    assert_eq!(prediction.status, SpanStatus::Ok);

    let http = pushed.iter().find(|s| s.name == "http_request").unwrap();
    assert_eq!(http.attributes["route"], "/predict");
    assert_eq!(http.attributes["status"], 200);
    assert_eq!(prediction.trace_id, http.trace_id);
    assert_eq!(prediction.parent_span_id.as_deref(), Some(http.span_id.as_str()));
}
