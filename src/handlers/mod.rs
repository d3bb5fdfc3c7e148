pub mod alerts;
pub mod health;
pub mod metrics_handler;
pub mod predict;
pub mod simulate;
pub mod system;

use std::sync::Arc;

use crate::alerts::AlertThresholds;
use crate::pipeline::PredictionPipeline;
use crate::stats::TelemetryContext;
use crate::telemetry::HostResources;

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PredictionPipeline>,
    pub ctx: Arc<TelemetryContext>,
    pub thresholds: AlertThresholds,
    pub host: Arc<HostResources>,
    pub service_name: String,
}

impl AppState {
    pub fn new(
        pipeline: Arc<PredictionPipeline>,
        thresholds: AlertThresholds,
        host: Arc<HostResources>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx: pipeline.context().clone(),
            pipeline,
            thresholds,
            host,
            service_name: service_name.into(),
        }
    }
}
