//! Alert evaluation
//!
//! Pure functions turning aggregate state into `0.0` / `1.0` alert signals.
//! Both alerts are gated on a minimum sample size so a single early failure
//! or a single uncertain prediction cannot trip them.

use serde::{Deserialize, Serialize};

use crate::stats::TelemetryContext;

/// Alert policy thresholds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AlertThresholds {
    /// Error-rate percentage above which `high_error_rate_alert` fires
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Requests required before the error-rate alert may fire
    #[serde(default = "default_min_requests")]
    pub min_requests: u64,

    /// Confidence below which a prediction is "low confidence"
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    /// Confidence above which a prediction is "high confidence"
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,

    /// Window entries required before the low-confidence alert may fire
    #[serde(default = "default_min_window_samples")]
    pub min_window_samples: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate_threshold: default_error_rate_threshold(),
            min_requests: default_min_requests(),
            low_confidence_threshold: default_low_confidence_threshold(),
            high_confidence_threshold: default_high_confidence_threshold(),
            min_window_samples: default_min_window_samples(),
        }
    }
}

fn default_error_rate_threshold() -> f64 {
    50.0
}

fn default_min_requests() -> u64 {
    10
}

fn default_low_confidence_threshold() -> f64 {
    0.6
}

fn default_high_confidence_threshold() -> f64 {
    0.9
}

fn default_min_window_samples() -> usize {
    5
}

/// Per-prediction confidence classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Low,
    Normal,
    High,
}

impl ConfidenceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Alert signals sampled at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertSignals {
    pub high_error_rate_alert: f64,
    pub low_confidence_alert: f64,
}

fn signal(active: bool) -> f64 {
    if active {
        1.0
    } else {
        0.0
    }
}

impl AlertThresholds {
    pub fn high_error_rate(&self, error_rate: f64, requests_total: u64) -> f64 {
        signal(error_rate > self.error_rate_threshold && requests_total >= self.min_requests)
    }

    pub fn low_confidence(&self, rolling_average: f64, window_count: usize) -> f64 {
        signal(
            rolling_average < self.low_confidence_threshold
                && window_count >= self.min_window_samples,
        )
    }

    pub fn classify_confidence(&self, confidence: f64) -> ConfidenceBand {
        if confidence < self.low_confidence_threshold {
            ConfidenceBand::Low
        } else if confidence > self.high_confidence_threshold {
            ConfidenceBand::High
        } else {
            ConfidenceBand::Normal
        }
    }

    /// Evaluate both alerts against the current aggregate state
    pub fn evaluate(&self, ctx: &TelemetryContext) -> AlertSignals {
        let counters = ctx.counters().snapshot();
        let window = ctx.window();
        AlertSignals {
            high_error_rate_alert: self.high_error_rate(counters.error_rate(), counters.requests),
            low_confidence_alert: self.low_confidence(window.average(), window.count()),
        }
    }
}
