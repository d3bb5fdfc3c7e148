//! Span export
//!
//! [`SpanExportLayer`] turns every closed span into a [`SpanRecord`] carrying
//! the fields recorded on it and hands it to a bounded queue without
//! blocking. [`TraceExporter`] drains the queue in batches (full batch or
//! flush interval, whichever comes first) and pushes them to the collector.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::span::{Attributes, Id, Record};
use tracing::{debug, info, warn, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::instruments;
use super::sink::{ExportError, ResourceAttributes, SpanSink};
use crate::logging::FieldVisitor;
use crate::signals::ShutdownSignal;

/// Closed spans buffered before new ones are dropped
pub const DEFAULT_QUEUE_SIZE: usize = 2048;

/// Spans per pushed batch
pub const DEFAULT_BATCH_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    /// An `error` field was recorded on the span
    Error,
}

/// One closed span
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub target: String,
    /// Unix milliseconds
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: f64,
    pub status: SpanStatus,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpanBatch {
    pub resource: ResourceAttributes,
    pub spans: Vec<SpanRecord>,
}

pub type SpanQueue = mpsc::Receiver<SpanRecord>;

/// Span state kept in the registry extensions until the span closes
struct OpenSpan {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    attributes: Map<String, Value>,
}

impl OpenSpan {
    fn finish(self, name: &str, target: &str) -> SpanRecord {
        let status = if self.attributes.contains_key("error") {
            SpanStatus::Error
        } else {
            SpanStatus::Ok
        };

        SpanRecord {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            name: name.to_string(),
            target: target.to_string(),
            start_time: self.started_at.timestamp_millis(),
            end_time: Utc::now().timestamp_millis(),
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            status,
            attributes: self.attributes,
        }
    }
}

fn new_trace_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn new_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Layer recording spans for export
pub struct SpanExportLayer {
    queue: mpsc::Sender<SpanRecord>,
}

impl SpanExportLayer {
    /// Create the layer and the queue its closed spans land in
    pub fn new(queue_size: usize) -> (Self, SpanQueue) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (Self { queue: tx }, rx)
    }
}

impl<S> Layer<S> for SpanExportLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let parent = span.parent().and_then(|parent| {
            let extensions = parent.extensions();
            let open = extensions.get::<OpenSpan>()?;
            Some((open.trace_id.clone(), open.span_id.clone()))
        });
        let (trace_id, parent_span_id) = match parent {
            Some((trace_id, parent_id)) => (trace_id, Some(parent_id)),
            None => (new_trace_id(), None),
        };

        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        extensions.insert(OpenSpan {
            trace_id,
            span_id: new_span_id(),
            parent_span_id,
            started_at: Utc::now(),
            started: Instant::now(),
            attributes: visitor.fields,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        if let Some(open) = extensions.get_mut::<OpenSpan>() {
            open.attributes.extend(visitor.fields);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let Some(open) = span.extensions_mut().remove::<OpenSpan>() else {
            return;
        };

        let record = open.finish(span.name(), span.metadata().target());
        if self.queue.try_send(record).is_err() {
            instruments::record_span_dropped();
        }
    }
}

/// Batching span pusher
pub struct TraceExporter {
    sink: Arc<dyn SpanSink>,
    resource: ResourceAttributes,
    batch_size: usize,
    flush_interval: Duration,
}

impl TraceExporter {
    pub fn new(
        sink: Arc<dyn SpanSink>,
        resource: ResourceAttributes,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            sink,
            resource,
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Push `spans` as one batch; failed batches are dropped
    pub async fn flush(&self, spans: Vec<SpanRecord>) -> Result<usize, ExportError> {
        if spans.is_empty() {
            return Ok(0);
        }

        let count = spans.len();
        let batch = SpanBatch {
            resource: self.resource.clone(),
            spans,
        };

        match self.sink.push_spans(&batch).await {
            Ok(()) => {
                debug!(spans = count, "Spans exported");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, spans = count, "Span export failed, batch dropped");
                instruments::record_export_failure("traces", e.reason());
                Err(e)
            }
        }
    }

    /// Drain `queue` until shutdown, then push whatever is still buffered
    pub fn spawn(
        self,
        mut queue: SpanQueue,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending = Vec::with_capacity(self.batch_size);
            let mut ticker = tokio::time::interval(self.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            info!(
                batch_size = self.batch_size,
                flush_interval_secs = self.flush_interval.as_secs(),
                "Trace exporter started"
            );

            loop {
                tokio::select! {
                    received = queue.recv() => match received {
                        Some(span) => {
                            pending.push(span);
                            if pending.len() >= self.batch_size {
                                let _ = self.flush(std::mem::take(&mut pending)).await;
                            }
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        let _ = self.flush(std::mem::take(&mut pending)).await;
                    }
                    _ = shutdown.recv() => {
                        while let Ok(span) = queue.try_recv() {
                            pending.push(span);
                        }
                        break;
                    }
                }
            }

            let _ = self.flush(pending).await;
            info!("Trace exporter stopped");
        })
    }
}
