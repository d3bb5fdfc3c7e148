//! Structured logging
//!
//! Every event is rendered as one JSON object per line:
//!
//! ```json
//! {"timestamp":"2024-05-01T12:00:00.000Z","level":"INFO","message":"Prediction made",
//!  "service":"titanic-api","target":"titanic_api::pipeline","confidence":0.87}
//! ```
//!
//! Sinks are stdout plus an optional append-only file, each behind a
//! `tracing-appender` non-blocking writer.

use anyhow::{Context as _, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::telemetry::SpanExportLayer;

/// Keys owned by the layer; event fields with the same name are dropped
const RESERVED_KEYS: [&str; 6] = ["timestamp", "level", "message", "service", "target", "span"];

/// Layer writing one JSON line per event
pub struct JsonLogLayer<W> {
    service: String,
    make_writer: W,
}

impl<W> JsonLogLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLogLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut entry = Map::new();
        entry.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        entry.insert("level".to_string(), Value::String(metadata.level().to_string()));
        entry.insert(
            "message".to_string(),
            Value::String(visitor.message.unwrap_or_default()),
        );
        entry.insert("service".to_string(), Value::String(self.service.clone()));
        entry.insert("target".to_string(), Value::String(metadata.target().to_string()));
        if let Some(span) = ctx.event_span(event) {
            entry.insert("span".to_string(), Value::String(span.name().to_string()));
        }
        for (key, value) in visitor.fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                entry.insert(key, value);
            }
        }

        let mut line = match serde_json::to_vec(&Value::Object(entry)) {
            Ok(line) => line,
            Err(_) => return,
        };
        line.push(b'\n');

        let mut writer = self.make_writer.make_writer();
        let _ = writer.write_all(&line);
    }
}

/// Collects event and span fields as JSON values
#[derive(Default)]
pub(crate) struct FieldVisitor {
    pub(crate) message: Option<String>,
    pub(crate) fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.insert(field, Value::String(rendered.trim_matches('"').to_string()));
        }
    }
}

/// Install the global subscriber
///
/// `spans` adds the span export layer when trace export is enabled. The
/// returned guards flush the non-blocking writers on drop and must be held
/// for the life of the process.
pub fn init_logging(
    config: &LoggingConfig,
    spans: Option<SpanExportLayer>,
) -> Result<Vec<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let mut guards = Vec::new();

    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);

    let file = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            guards.push(guard);
            Some(writer)
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(spans);
    match config.format {
        LogFormat::Json => registry
            .with(JsonLogLayer::new(&config.service_name, stdout))
            .with(file.map(|w| JsonLogLayer::new(&config.service_name, w)))
            .try_init()?,
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(stdout))
            .with(file.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()?,
    }

    Ok(guards)
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    Ok(tracing_appender::rolling::never(directory, file_name))
}
