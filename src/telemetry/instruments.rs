use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;

use super::point::PointKind;

pub const PREDICTIONS_TOTAL: &str = "predictions_total";
pub const PREDICTION_DURATION: &str = "prediction_duration_seconds";
pub const MODEL_CONFIDENCE: &str = "model_confidence_score";
pub const LOW_CONFIDENCE_PREDICTIONS: &str = "low_confidence_predictions";
pub const HIGH_CONFIDENCE_PREDICTIONS: &str = "high_confidence_predictions";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";
pub const EXPORT_FAILURES_TOTAL: &str = "telemetry_export_failures_total";
pub const SPANS_DROPPED_TOTAL: &str = "telemetry_spans_dropped_total";

pub const API_ERROR_RATE: &str = "api_error_rate";
pub const API_REQUEST_RATE: &str = "api_request_rate";
pub const AVERAGE_CONFIDENCE: &str = "average_confidence";
pub const HIGH_ERROR_RATE_ALERT: &str = "high_error_rate_alert";
pub const LOW_CONFIDENCE_ALERT: &str = "low_confidence_alert";

pub const SYSTEM_CPU_USAGE: &str = "system_cpu_usage_percent";
pub const SYSTEM_MEMORY_USAGE: &str = "system_memory_usage_percent";
pub const SYSTEM_DISK_USAGE: &str = "system_disk_usage_percent";
pub const PROCESS_DISK_READ_BYTES: &str = "process_disk_read_bytes";
pub const PROCESS_DISK_WRITTEN_BYTES: &str = "process_disk_written_bytes";
pub const SYSTEM_NETWORK_SENT_BYTES: &str = "system_network_sent_bytes";
pub const SYSTEM_NETWORK_RECEIVED_BYTES: &str = "system_network_received_bytes";

const LATENCY_BUCKETS: [f64; 11] = [
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];
const CONFIDENCE_BUCKETS: [f64; 10] = [0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95];
const HTTP_DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Static description of one instrument
#[derive(Debug, Clone, Copy)]
pub struct Instrument {
    pub name: &'static str,
    pub kind: PointKind,
    pub unit: &'static str,
    pub description: &'static str,
}

/// Every counter and histogram the service records
pub const INSTRUMENTS: &[Instrument] = &[
    Instrument {
        name: PREDICTIONS_TOTAL,
        kind: PointKind::Counter,
        unit: "1",
        description: "Total number of predictions made",
    },
    Instrument {
        name: PREDICTION_DURATION,
        kind: PointKind::Histogram,
        unit: "s",
        description: "Time spent processing predictions",
    },
    Instrument {
        name: MODEL_CONFIDENCE,
        kind: PointKind::Histogram,
        unit: "1",
        description: "Model confidence scores",
    },
    Instrument {
        name: LOW_CONFIDENCE_PREDICTIONS,
        kind: PointKind::Counter,
        unit: "1",
        description: "Number of predictions below the low-confidence threshold",
    },
    Instrument {
        name: HIGH_CONFIDENCE_PREDICTIONS,
        kind: PointKind::Counter,
        unit: "1",
        description: "Number of predictions above the high-confidence threshold",
    },
    Instrument {
        name: HTTP_REQUESTS_TOTAL,
        kind: PointKind::Counter,
        unit: "1",
        description: "Total number of HTTP requests",
    },
    Instrument {
        name: HTTP_REQUEST_DURATION,
        kind: PointKind::Histogram,
        unit: "s",
        description: "HTTP request duration in seconds",
    },
    Instrument {
        name: HTTP_ERRORS_TOTAL,
        kind: PointKind::Counter,
        unit: "1",
        description: "Total number of HTTP responses with status >= 400",
    },
    Instrument {
        name: EXPORT_FAILURES_TOTAL,
        kind: PointKind::Counter,
        unit: "1",
        description: "Export batches dropped because the collector failed",
    },
    Instrument {
        name: SPANS_DROPPED_TOTAL,
        kind: PointKind::Counter,
        unit: "1",
        description: "Closed spans dropped because the export queue was full",
    },
];

/// Look up an instrument by metric name, tolerating Prometheus suffixes
pub fn find(name: &str) -> Option<&'static Instrument> {
    let base = ["_bucket", "_sum", "_count"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|base| INSTRUMENTS.iter().any(|i| i.name == *base))
        .unwrap_or(name);
    INSTRUMENTS.iter().find(|i| i.name == base)
}

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(PREDICTION_DURATION.to_string()), &LATENCY_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(MODEL_CONFIDENCE.to_string()), &CONFIDENCE_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            &HTTP_DURATION_BUCKETS,
        )
}

/// Install the Prometheus recorder globally and describe every metric
pub fn install() -> Result<PrometheusHandle, BuildError> {
    let handle = builder()?.install_recorder()?;
    describe_all();
    Ok(handle)
}

/// Build a recorder without installing it (tests, local recorders)
pub fn build_recorder() -> Result<PrometheusRecorder, BuildError> {
    Ok(builder()?.build_recorder())
}

/// Register metric descriptions (can be called multiple times safely)
pub fn describe_all() {
    for instrument in INSTRUMENTS {
        match instrument.kind {
            PointKind::Counter => describe_counter!(instrument.name, instrument.description),
            PointKind::Histogram if instrument.unit == "s" => {
                describe_histogram!(instrument.name, Unit::Seconds, instrument.description)
            }
            PointKind::Histogram => describe_histogram!(instrument.name, instrument.description),
            PointKind::Gauge => describe_gauge!(instrument.name, instrument.description),
        }
    }

    gauge!("titanic_api_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a successful prediction
pub fn record_prediction(model: &str, result: i64) {
    counter!(
        PREDICTIONS_TOTAL,
        "model" => model.to_string(),
        "result" => result.to_string(),
    )
    .increment(1);
}

pub fn record_prediction_latency(duration: Duration) {
    histogram!(PREDICTION_DURATION).record(duration.as_secs_f64());
}

pub fn record_prediction_confidence(confidence: f64) {
    histogram!(MODEL_CONFIDENCE).record(confidence);
}

pub fn record_low_confidence() {
    counter!(LOW_CONFIDENCE_PREDICTIONS).increment(1);
}

pub fn record_high_confidence() {
    counter!(HIGH_CONFIDENCE_PREDICTIONS).increment(1);
}

/// Record one HTTP request and its duration
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION,
        "method" => method.to_string(),
        "route" => route.to_string(),
    )
    .record(duration.as_secs_f64());
}

pub fn record_http_error(method: &str, route: &str, status: u16) {
    counter!(
        HTTP_ERRORS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// `signal` is `metrics` or `traces`
pub fn record_export_failure(signal: &'static str, reason: &'static str) {
    counter!(EXPORT_FAILURES_TOTAL, "signal" => signal, "reason" => reason).increment(1);
}

pub fn record_span_dropped() {
    counter!(SPANS_DROPPED_TOTAL).increment(1);
}

/// Mirror a sampled gauge into the recorder so `/metrics` shows it too
pub fn set_gauge(name: &str, value: f64) {
    gauge!(name.to_string()).set(value);
}
