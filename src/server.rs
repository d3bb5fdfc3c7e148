use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    classifier::{Classifier, LogisticClassifier},
    config::Config,
    handlers::{self, AppState},
    middleware::track_http,
    pipeline::PredictionPipeline,
    signals::setup_signal_handlers,
    stats::TelemetryContext,
    telemetry::{
        instruments, register_host_gauges, register_service_gauges, HostResources, HttpPushSink,
        MetricSink, MetricsExporter, MetricsRegistry, NullSink, ResourceAttributes, SpanQueue,
        TraceExporter,
    },
};

/// Request bodies above this size are rejected before decoding
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Start the prediction service
///
/// This function:
/// 1. Installs the Prometheus recorder
/// 2. Builds the telemetry context, pipeline and gauge registry
/// 3. Spawns the periodic metrics exporter and, given a span queue, the
///    trace exporter
/// 4. Serves requests until SIGTERM/SIGINT, then stops both exporters
pub async fn start_server(config: Config, spans: Option<SpanQueue>) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = instruments::install().context("Failed to install Prometheus recorder")?;

    let state = build_state(&config)?;
    let exporter = Arc::new(build_exporter(&config, &state, Some(metrics_handle.clone()))?);

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();
    let exporter_handle = exporter.clone().spawn(shutdown_tx.subscribe());
    let trace_handle = match spans {
        Some(queue) => Some(build_trace_exporter(&config)?.spawn(queue, shutdown_tx.subscribe())),
        None => None,
    };

    let app = build_app(state, Arc::new(metrics_handle));

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting {} on {}", config.logging.service_name, addr);
    info!(
        window_capacity = config.window.capacity,
        telemetry_enabled = config.telemetry.enabled,
        collector = %config.telemetry.collector_endpoint,
        export_interval_secs = config.telemetry.export_interval_seconds,
        "Configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    exporter_handle.await?;
    if let Some(handle) = trace_handle {
        handle.await?;
    }

    if config.telemetry.enabled {
        // Last cumulative values before exit
        let _ = exporter.tick().await;
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Build the shared handler state from configuration
pub fn build_state(config: &Config) -> Result<AppState> {
    let classifier: Arc<dyn Classifier> = match &config.model.weights_path {
        Some(path) => {
            let classifier = LogisticClassifier::from_file(path)
                .with_context(|| format!("Failed to load model weights from {}", path.display()))?;
            info!(path = %path.display(), "Loaded model weights");
            Arc::new(classifier)
        }
        None => {
            info!("Using built-in model weights");
            Arc::new(LogisticClassifier::default())
        }
    };

    let ctx = Arc::new(TelemetryContext::new(config.window.capacity));
    let pipeline = Arc::new(PredictionPipeline::new(ctx, classifier, config.alerts));
    info!(
        model = pipeline.classifier_name(),
        window_capacity = pipeline.context().window().capacity(),
        "Prediction pipeline ready"
    );

    Ok(AppState::new(
        pipeline,
        config.alerts,
        Arc::new(HostResources::new()),
        &config.logging.service_name,
    ))
}

/// Build the gauge registry and exporter for `state`
pub fn build_exporter(
    config: &Config,
    state: &AppState,
    prometheus: Option<PrometheusHandle>,
) -> Result<MetricsExporter> {
    let registry = Arc::new(MetricsRegistry::new());
    register_service_gauges(&registry, state.ctx.clone(), config.alerts);
    register_host_gauges(&registry, state.host.clone());
    info!(gauges = registry.len(), "Gauge callbacks registered");

    let telemetry = &config.telemetry;
    let sink: Arc<dyn MetricSink> = if telemetry.enabled {
        let sink = HttpPushSink::new(
            &telemetry.collector_endpoint,
            Duration::from_secs(telemetry.export_timeout_seconds),
        )?;
        info!(endpoint = sink.endpoint(), "Pushing metrics");
        Arc::new(sink)
    } else {
        info!("Metric push disabled, /metrics remains available");
        Arc::new(NullSink)
    };

    Ok(MetricsExporter::new(
        registry,
        prometheus,
        sink,
        resource(config),
        Duration::from_secs(telemetry.export_interval_seconds),
    ))
}

/// Build the batching span pusher for the configured trace endpoint
pub fn build_trace_exporter(config: &Config) -> Result<TraceExporter> {
    let telemetry = &config.telemetry;
    let sink = HttpPushSink::new(
        &telemetry.trace_endpoint,
        Duration::from_secs(telemetry.export_timeout_seconds),
    )?;
    info!(endpoint = sink.endpoint(), "Pushing spans");

    Ok(TraceExporter::new(
        Arc::new(sink),
        resource(config),
        telemetry.trace_batch_size,
        Duration::from_secs(telemetry.export_interval_seconds),
    ))
}

fn resource(config: &Config) -> ResourceAttributes {
    ResourceAttributes {
        service_name: config.logging.service_name.clone(),
        service_version: config.telemetry.service_version.clone(),
    }
}

/// Create the Axum router with all routes and middleware
pub fn build_app(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .route("/predict", post(handlers::predict::predict))
        .route("/metrics/alerts", get(handlers::alerts::alert_metrics))
        .route("/metrics/system", get(handlers::system::system_metrics))
        .route("/reset-metrics", post(handlers::alerts::reset_metrics))
        .route("/simulate_error", get(handlers::simulate::simulate_error))
        .route("/simulate_slow", get(handlers::simulate::simulate_slow))
        .with_state(state)
        .merge(metrics_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(track_http))
        .layer(TraceLayer::new_for_http())
}
