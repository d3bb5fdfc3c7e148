//! Pull-sampled gauge registry
//!
//! Gauges are registered as zero-argument query functions. Sampling calls
//! every function in isolation: an `Err` or a panic from one callback is
//! replaced by that gauge's sentinel and never affects the others.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use super::instruments;
use super::point::MetricPoint;
use crate::alerts::AlertThresholds;
use crate::stats::{TelemetryContext, EMPTY_WINDOW_AVERAGE};

/// Neutral value for rate / percentage gauges
pub const RATE_SENTINEL: f64 = 0.0;

/// Neutral value for confidence-style gauges
pub const CONFIDENCE_SENTINEL: f64 = EMPTY_WINDOW_AVERAGE;

/// A gauge's underlying query failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResourceQueryError {
    #[error("{0} is unavailable")]
    Unavailable(&'static str),

    #[error("{resource} query failed: {reason}")]
    Failed {
        resource: &'static str,
        reason: String,
    },
}

pub type GaugeCallback = Arc<dyn Fn() -> Result<f64, ResourceQueryError> + Send + Sync>;

#[derive(Clone)]
struct GaugeRegistration {
    unit: &'static str,
    sentinel: f64,
    callback: GaugeCallback,
}

/// Value read from one gauge during a sampling pass
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub name: String,
    pub value: f64,
    pub unit: &'static str,
    /// The callback failed and `value` is the sentinel
    pub substituted: bool,
}

impl GaugeSample {
    pub fn to_point(&self, at: DateTime<Utc>) -> MetricPoint {
        MetricPoint::gauge(self.name.clone(), self.value, self.unit, at)
    }
}

#[derive(Default)]
pub struct MetricsRegistry {
    gauges: DashMap<String, GaugeRegistration>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a gauge callback
    pub fn register_gauge<F>(&self, name: impl Into<String>, unit: &'static str, sentinel: f64, callback: F)
    where
        F: Fn() -> Result<f64, ResourceQueryError> + Send + Sync + 'static,
    {
        self.gauges.insert(
            name.into(),
            GaugeRegistration {
                unit,
                sentinel,
                callback: Arc::new(callback),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    pub fn gauge_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gauges.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Invoke every gauge callback, substituting sentinels for failures
    ///
    /// Samples are sorted by gauge name.
    pub fn sample_gauges(&self) -> Vec<GaugeSample> {
        // Clone out so no map shard lock is held while callbacks run
        let registrations: Vec<(String, GaugeRegistration)> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut samples: Vec<GaugeSample> = registrations
            .into_iter()
            .map(|(name, reg)| sample_one(name, &reg))
            .collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        samples
    }
}

fn sample_one(name: String, reg: &GaugeRegistration) -> GaugeSample {
    let result = catch_unwind(AssertUnwindSafe(|| (reg.callback)()));

    let value = match result {
        Ok(Ok(value)) if value.is_finite() => Some(value),
        Ok(Ok(value)) => {
            tracing::warn!(gauge = %name, value, "Gauge returned a non-finite value, using sentinel");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(gauge = %name, error = %e, "Gauge query failed, using sentinel");
            None
        }
        Err(_) => {
            tracing::error!(gauge = %name, "Gauge callback panicked, using sentinel");
            None
        }
    };

    GaugeSample {
        substituted: value.is_none(),
        value: value.unwrap_or(reg.sentinel),
        name,
        unit: reg.unit,
    }
}

/// Register the gauges derived from request accounting and the alert policy
pub fn register_service_gauges(
    registry: &MetricsRegistry,
    ctx: Arc<TelemetryContext>,
    thresholds: AlertThresholds,
) {
    let c = ctx.clone();
    registry.register_gauge(instruments::API_ERROR_RATE, "%", RATE_SENTINEL, move || {
        Ok(c.counters().error_rate())
    });

    let c = ctx.clone();
    registry.register_gauge(instruments::API_REQUEST_RATE, "1/s", RATE_SENTINEL, move || {
        Ok(c.counters().requests_per_second())
    });

    let c = ctx.clone();
    registry.register_gauge(instruments::AVERAGE_CONFIDENCE, "1", CONFIDENCE_SENTINEL, move || {
        Ok(c.window().average())
    });

    let c = ctx.clone();
    registry.register_gauge(instruments::HIGH_ERROR_RATE_ALERT, "1", RATE_SENTINEL, move || {
        Ok(thresholds.evaluate(&c).high_error_rate_alert)
    });

    registry.register_gauge(instruments::LOW_CONFIDENCE_ALERT, "1", RATE_SENTINEL, move || {
        Ok(thresholds.evaluate(&ctx).low_confidence_alert)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_gauge_does_not_affect_others() {
        let registry = MetricsRegistry::new();
        registry.register_gauge("cpu", "%", RATE_SENTINEL, || {
            Err(ResourceQueryError::Unavailable("cpu"))
        });
        registry.register_gauge("confidence", "1", CONFIDENCE_SENTINEL, || {
            Err(ResourceQueryError::Failed {
                resource: "window",
                reason: "boom".to_string(),
            })
        });
        registry.register_gauge("memory", "%", RATE_SENTINEL, || Ok(42.0));
        registry.register_gauge("panicky", "%", RATE_SENTINEL, || panic!("query exploded"));
        registry.register_gauge("nan", "%", RATE_SENTINEL, || Ok(f64::NAN));

        let samples = registry.sample_gauges();
        let get = |name: &str| samples.iter().find(|s| s.name == name).unwrap().clone();

        assert_eq!(samples.len(), 5);
        assert_eq!(get("memory").value, 42.0);
        assert!(!get("memory").substituted);
        assert_eq!(get("cpu").value, 0.0);
        assert!(get("cpu").substituted);
        assert_eq!(get("confidence").value, 1.0);
        assert_eq!(get("panicky").value, 0.0);
        assert_eq!(get("nan").value, 0.0);
    }

    #[test]
    fn test_samples_sorted_by_name() {
        let registry = MetricsRegistry::new();
        registry.register_gauge("b", "1", 0.0, || Ok(2.0));
        registry.register_gauge("a", "1", 0.0, || Ok(1.0));

        let names: Vec<_> = registry.sample_gauges().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_service_gauges_track_context() {
        let registry = MetricsRegistry::new();
        let ctx = Arc::new(TelemetryContext::new(20));
        register_service_gauges(&registry, ctx.clone(), AlertThresholds::default());

        for _ in 0..10 {
            ctx.ticket().fail();
        }
        for _ in 0..5 {
            ctx.window().record(0.5);
        }

        let samples = registry.sample_gauges();
        let value = |name: &str| samples.iter().find(|s| s.name == name).unwrap().value;

        assert_eq!(registry.len(), 5);
        assert_eq!(value(instruments::API_ERROR_RATE), 100.0);
        assert_eq!(value(instruments::AVERAGE_CONFIDENCE), 0.5);
        assert_eq!(value(instruments::HIGH_ERROR_RATE_ALERT), 1.0);
        assert_eq!(value(instruments::LOW_CONFIDENCE_ALERT), 1.0);
        assert!(value(instruments::API_REQUEST_RATE) >= 0.0);
    }
}
