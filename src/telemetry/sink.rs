use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use super::point::MetricPoint;
use super::trace::SpanBatch;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector rejected batch with status {status}")]
    Rejected { status: u16 },
}

impl ExportError {
    /// Short label used on the export failure counter
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport(e) if e.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Attributes identifying this process to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAttributes {
    #[serde(rename = "service.name")]
    pub service_name: String,
    #[serde(rename = "service.version")]
    pub service_version: String,
}

/// One export tick worth of points
#[derive(Debug, Clone, Serialize)]
pub struct ExportBatch {
    pub resource: ResourceAttributes,
    pub metrics: Vec<MetricPoint>,
}

/// Destination of export batches
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError>;

    fn name(&self) -> &'static str;
}

/// Destination of closed-span batches
#[async_trait]
pub trait SpanSink: Send + Sync {
    async fn push_spans(&self, batch: &SpanBatch) -> Result<(), ExportError>;
}

/// JSON POST to an HTTP collector
pub struct HttpPushSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPushSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<(), ExportError> {
        let response = self.client.post(&self.endpoint).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSink for HttpPushSink {
    async fn push(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        self.post(batch).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl SpanSink for HttpPushSink {
    async fn push_spans(&self, batch: &SpanBatch) -> Result<(), ExportError> {
        self.post(batch).await
    }
}

/// Discards every batch; used when export is disabled
pub struct NullSink;

#[async_trait]
impl MetricSink for NullSink {
    async fn push(&self, _batch: &ExportBatch) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[async_trait]
impl SpanSink for NullSink {
    async fn push_spans(&self, _batch: &SpanBatch) -> Result<(), ExportError> {
        Ok(())
    }
}
