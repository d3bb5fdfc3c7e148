//! Metric instruments, pull-sampled gauges, span export and the periodic
//! push exporters

pub mod exporter;
pub mod host;
pub mod instruments;
pub mod point;
pub mod registry;
pub mod sink;
pub mod snapshot;
pub mod trace;

pub use exporter::{ExportReport, MetricsExporter};
pub use host::{register_host_gauges, HostResources, SystemOverview};
pub use point::{MetricPoint, PointKind};
pub use registry::{
    register_service_gauges, GaugeSample, MetricsRegistry, ResourceQueryError,
    CONFIDENCE_SENTINEL, RATE_SENTINEL,
};
pub use sink::{
    ExportBatch, ExportError, HttpPushSink, MetricSink, NullSink, ResourceAttributes, SpanSink,
};
pub use trace::{SpanExportLayer, SpanQueue, SpanRecord, SpanStatus, TraceExporter};
