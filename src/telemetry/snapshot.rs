//! Cumulative counter/histogram snapshot for the push batch
//!
//! The Prometheus recorder already holds every counter and histogram, so
//! each export tick renders it and converts the samples back into
//! [`MetricPoint`]s instead of keeping a second copy of the state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus_parse::{Sample, Scrape, Value};
use std::collections::BTreeMap;

use super::instruments;
use super::point::{MetricPoint, PointKind};

/// Parse rendered Prometheus text into cumulative points
///
/// Gauges and summaries are skipped: gauges are sampled from the registry
/// directly and the recorder holds no summaries.
pub fn cumulative_points(prometheus_text: &str, at: DateTime<Utc>) -> Result<Vec<MetricPoint>> {
    let lines: Vec<_> = prometheus_text.lines().map(|s| Ok(s.to_owned())).collect();
    let scrape = Scrape::parse(lines.into_iter())?;
    let timestamp = at.timestamp_millis();

    let mut points = Vec::new();
    for sample in &scrape.samples {
        match &sample.value {
            Value::Counter(v) | Value::Untyped(v) => {
                let instrument = instruments::find(&sample.metric);
                points.push(MetricPoint {
                    name: sample.metric.clone(),
                    value: *v,
                    unit: instrument.map(|i| i.unit).unwrap_or("1").to_string(),
                    kind: instrument.map(|i| i.kind).unwrap_or(PointKind::Counter),
                    labels: labels_of(sample),
                    timestamp,
                });
            }
            Value::Histogram(buckets) => {
                let unit = instruments::find(&sample.metric).map(|i| i.unit).unwrap_or("1");
                for bucket in buckets {
                    let mut labels = labels_of(sample);
                    labels.insert("le".to_string(), format_bound(bucket.less_than));
                    points.push(MetricPoint {
                        name: format!("{}_bucket", sample.metric),
                        value: bucket.count,
                        unit: unit.to_string(),
                        kind: PointKind::Histogram,
                        labels,
                        timestamp,
                    });
                }
            }
            Value::Gauge(_) | Value::Summary(_) => {}
        }
    }

    points.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
    Ok(points)
}

fn labels_of(sample: &Sample) -> BTreeMap<String, String> {
    sample
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn format_bound(bound: f64) -> String {
    if bound.is_infinite() {
        "+Inf".to_string()
    } else {
        bound.to_string()
    }
}
