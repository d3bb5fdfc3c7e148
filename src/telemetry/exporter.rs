//! Periodic metric export
//!
//! Every tick samples the gauge registry, snapshots the recorder's
//! cumulative counters and histograms, and pushes one batch to the sink.
//! A failed push is logged and counted, and the batch is dropped. The next
//! tick carries fresh cumulative values so nothing is retried.

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::instruments;
use super::point::MetricPoint;
use super::registry::MetricsRegistry;
use super::sink::{ExportBatch, ExportError, MetricSink, ResourceAttributes};
use super::snapshot;
use crate::signals::ShutdownSignal;

/// Summary of one successful tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub points: usize,
    pub substituted_gauges: usize,
}

pub struct MetricsExporter {
    registry: Arc<MetricsRegistry>,
    prometheus: Option<PrometheusHandle>,
    sink: Arc<dyn MetricSink>,
    resource: ResourceAttributes,
    interval: Duration,
}

impl MetricsExporter {
    pub fn new(
        registry: Arc<MetricsRegistry>,
        prometheus: Option<PrometheusHandle>,
        sink: Arc<dyn MetricSink>,
        resource: ResourceAttributes,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            prometheus,
            sink,
            resource,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Assemble the batch for one tick
    ///
    /// Gauge callbacks may block on host queries, so sampling runs on the
    /// blocking pool.
    pub async fn collect(&self) -> (ExportBatch, usize) {
        let registry = self.registry.clone();
        let samples = match tokio::task::spawn_blocking(move || registry.sample_gauges()).await {
            Ok(samples) => samples,
            Err(e) => {
                error!(error = %e, "Gauge sampling task failed");
                Vec::new()
            }
        };

        let now = Utc::now();
        let substituted = samples.iter().filter(|s| s.substituted).count();

        let mut metrics: Vec<MetricPoint> = Vec::with_capacity(samples.len());
        for sample in &samples {
            instruments::set_gauge(&sample.name, sample.value);
            metrics.push(sample.to_point(now));
        }

        if let Some(handle) = &self.prometheus {
            handle.run_upkeep();
            match snapshot::cumulative_points(&handle.render(), now) {
                Ok(points) => metrics.extend(points),
                Err(e) => warn!(error = %e, "Failed to snapshot cumulative metrics"),
            }
        }

        let batch = ExportBatch {
            resource: self.resource.clone(),
            metrics,
        };
        (batch, substituted)
    }

    /// Run one export cycle
    pub async fn tick(&self) -> Result<ExportReport, ExportError> {
        let (batch, substituted_gauges) = self.collect().await;
        let points = batch.metrics.len();

        match self.sink.push(&batch).await {
            Ok(()) => {
                debug!(points, sink = self.sink.name(), "Metrics exported");
                Ok(ExportReport {
                    points,
                    substituted_gauges,
                })
            }
            Err(e) => {
                warn!(
                    error = %e,
                    points,
                    sink = self.sink.name(),
                    "Metric export failed, batch dropped"
                );
                instruments::record_export_failure("metrics", e.reason());
                Err(e)
            }
        }
    }

    /// Run ticks on a fixed interval until shutdown
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<ShutdownSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately
            ticker.tick().await;

            info!(
                interval_secs = self.interval.as_secs(),
                sink = self.sink.name(),
                "Metrics exporter started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.tick().await;
                    }
                    _ = shutdown.recv() => {
                        info!("Metrics exporter stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::registry::{ResourceQueryError, RATE_SENTINEL};
    use crate::telemetry::sink::{HttpPushSink, NullSink};
    use httpmock::prelude::*;

    fn resource() -> ResourceAttributes {
        ResourceAttributes {
            service_name: "titanic-api".to_string(),
            service_version: "test".to_string(),
        }
    }

    fn registry() -> Arc<MetricsRegistry> {
        let registry = MetricsRegistry::new();
        registry.register_gauge("api_error_rate", "%", RATE_SENTINEL, || Ok(25.0));
        registry.register_gauge("system_cpu_usage_percent", "%", RATE_SENTINEL, || {
            Err(ResourceQueryError::Unavailable("cpu"))
        });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_tick_pushes_gauges() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/metrics");
                then.status(200);
            })
            .await;

        let sink = HttpPushSink::new(server.url("/v1/metrics"), Duration::from_secs(2)).unwrap();
        let exporter = MetricsExporter::new(
            registry(),
            None,
            Arc::new(sink),
            resource(),
            Duration::from_secs(5),
        );

        let report = exporter.tick().await.unwrap();
        assert_eq!(report.points, 2);
        assert_eq!(report.substituted_gauges, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_push_is_dropped_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/metrics");
                then.status(500);
            })
            .await;

        let sink = HttpPushSink::new(server.url("/v1/metrics"), Duration::from_secs(2)).unwrap();
        let exporter = MetricsExporter::new(
            registry(),
            None,
            Arc::new(sink),
            resource(),
            Duration::from_secs(5),
        );

        assert!(exporter.tick().await.is_err());
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_unreachable_collector_does_not_panic() {
        let sink = HttpPushSink::new("http://127.0.0.1:1/v1/metrics", Duration::from_millis(200)).unwrap();
        let exporter = MetricsExporter::new(
            registry(),
            None,
            Arc::new(sink),
            resource(),
            Duration::from_secs(5),
        );

        let err = exporter.tick().await.unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
    }

    #[tokio::test]
    async fn test_collect_includes_cumulative_points() {
        let recorder = instruments::build_recorder().unwrap();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            instruments::record_prediction("logistic_regression", 1);
        });

        let exporter = MetricsExporter::new(
            registry(),
            Some(handle),
            Arc::new(NullSink),
            resource(),
            Duration::from_secs(5),
        );

        let (batch, _) = exporter.collect().await;
        assert!(batch
            .metrics
            .iter()
            .any(|p| p.name == "predictions_total" && p.value == 1.0));
    }

    #[tokio::test]
    async fn test_spawn_stops_on_shutdown() {
        let exporter = Arc::new(MetricsExporter::new(
            registry(),
            None,
            Arc::new(NullSink),
            resource(),
            Duration::from_millis(10),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = exporter.spawn(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(ShutdownSignal::Graceful).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
