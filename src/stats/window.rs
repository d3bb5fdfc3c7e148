//! Rolling confidence window
//!
//! Keeps the most recent `capacity` prediction confidences and answers mean /
//! count queries over them. Every operation runs inside one short mutex
//! section, so a reader never observes a half-applied insert and the mean it
//! computes always lies between the retained min and max.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Mean reported for an empty window ("no negative signal yet")
pub const EMPTY_WINDOW_AVERAGE: f64 = 1.0;

#[derive(Debug)]
pub struct RollingWindow {
    capacity: usize,
    values: Mutex<VecDeque<f64>>,
}

impl RollingWindow {
    /// Create an empty window retaining at most `capacity` values
    ///
    /// # Panics
    /// Panics if `capacity` is zero (configuration validation rejects it).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be positive");
        Self {
            capacity,
            values: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a confidence value, evicting the oldest one once full
    ///
    /// # Panics
    /// Confidence outside `[0, 1]` (or NaN) is a caller bug and panics.
    pub fn record(&self, confidence: f64) {
        assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence must be within [0, 1], got {}",
            confidence
        );

        let mut values = self.lock();
        values.push_back(confidence);
        while values.len() > self.capacity {
            values.pop_front();
        }
    }

    /// Arithmetic mean of the retained values, `1.0` when empty
    pub fn average(&self) -> f64 {
        let values = self.lock();
        if values.is_empty() {
            return EMPTY_WINDOW_AVERAGE;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Number of retained values strictly below `threshold`
    pub fn count_below(&self, threshold: f64) -> usize {
        self.lock().iter().filter(|c| **c < threshold).count()
    }

    /// Copy of the retained values, oldest first
    pub fn snapshot(&self) -> Vec<f64> {
        self.lock().iter().copied().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<f64>> {
        // push/pop never leave the deque torn, so a poisoned lock is still usable
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
