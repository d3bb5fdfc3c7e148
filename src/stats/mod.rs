//! In-process aggregation of request telemetry
//!
//! [`TelemetryContext`] is the single owner of all cross-request mutable
//! state: request/error counters, the rolling confidence window and the
//! low/high confidence tallies. It is created once at startup and shared
//! (`Arc`) with the prediction pipeline, the gauge callbacks and the HTTP
//! handlers.

pub mod counters;
pub mod window;

pub use counters::{rate_per_second, CounterSnapshot, RequestCounters, RequestTicket};
pub use window::{RollingWindow, EMPTY_WINDOW_AVERAGE};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::alerts::{AlertThresholds, ConfidenceBand};

/// Default rolling window capacity
pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

/// Totals of predictions per confidence band
#[derive(Debug, Default)]
pub struct ConfidenceTally {
    low: AtomicU64,
    high: AtomicU64,
}

impl ConfidenceTally {
    pub fn record(&self, band: ConfidenceBand) {
        match band {
            ConfidenceBand::Low => {
                self.low.fetch_add(1, Ordering::SeqCst);
            }
            ConfidenceBand::High => {
                self.high.fetch_add(1, Ordering::SeqCst);
            }
            ConfidenceBand::Normal => {}
        }
    }

    pub fn low(&self) -> u64 {
        self.low.load(Ordering::SeqCst)
    }

    pub fn high(&self) -> u64 {
        self.high.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.low.store(0, Ordering::SeqCst);
        self.high.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct TelemetryContext {
    counters: Arc<RequestCounters>,
    window: RollingWindow,
    tally: ConfidenceTally,
}

impl TelemetryContext {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            counters: Arc::new(RequestCounters::new()),
            window: RollingWindow::new(window_capacity),
            tally: ConfidenceTally::default(),
        }
    }

    pub fn counters(&self) -> &Arc<RequestCounters> {
        &self.counters
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn tally(&self) -> &ConfidenceTally {
        &self.tally
    }

    /// Open the accounting ticket for one request
    pub fn ticket(&self) -> RequestTicket {
        RequestTicket::new(self.counters.clone())
    }

    /// Resolve `ticket` as a success and record its confidence
    ///
    /// Runs inside the ticket's accounting section, so a concurrent reset
    /// sees either both the request and its window entry or neither.
    pub fn record_success(&self, ticket: RequestTicket, confidence: f64, band: ConfidenceBand) {
        ticket.succeed_with(|| {
            self.window.record(confidence);
            self.tally.record(band);
        });
    }

    /// Zero counters and tallies, empty the window
    pub fn reset(&self) {
        self.counters.reset_with(|| {
            self.window.clear();
            self.tally.reset();
        });
    }

    /// Operator-facing view of the current aggregate and alert state
    pub fn alert_snapshot(&self, thresholds: &AlertThresholds) -> AlertSnapshot {
        let counters = self.counters.snapshot();
        let error_rate = counters.error_rate();
        let average_confidence = self.window.average();
        let window_count = self.window.count();

        AlertSnapshot {
            timestamp: Utc::now(),
            error_rate,
            request_count: counters.requests,
            error_count: counters.errors,
            requests_per_second: self.counters.requests_per_second(),
            average_confidence: round3(average_confidence),
            recent_predictions_count: window_count,
            alerting_metrics: AlertingMetrics {
                api_error_rate: error_rate,
                low_confidence_predictions: self
                    .window
                    .count_below(thresholds.low_confidence_threshold),
                high_error_rate_alert: thresholds.high_error_rate(error_rate, counters.requests),
                low_confidence_alert: thresholds.low_confidence(average_confidence, window_count),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    pub timestamp: DateTime<Utc>,
    pub error_rate: f64,
    pub request_count: u64,
    pub error_count: u64,
    pub requests_per_second: f64,
    pub average_confidence: f64,
    pub recent_predictions_count: usize,
    pub alerting_metrics: AlertingMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertingMetrics {
    pub api_error_rate: f64,
    pub low_confidence_predictions: usize,
    pub high_error_rate_alert: f64,
    pub low_confidence_alert: f64,
}

/// Round to 3 decimal places for API responses
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
