use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// How a metric point aggregates at the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    /// Monotonic cumulative sum
    Counter,
    /// Cumulative bucket / sum / count series
    Histogram,
    /// Instantaneous value, last value wins
    Gauge,
}

impl PointKind {
    pub fn is_cumulative(self) -> bool {
        !matches!(self, Self::Gauge)
    }
}

/// Wire unit pushed to the telemetry backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub kind: PointKind,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl MetricPoint {
    pub fn gauge(name: impl Into<String>, value: f64, unit: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            kind: PointKind::Gauge,
            labels: BTreeMap::new(),
            timestamp: at.timestamp_millis(),
        }
    }
}
