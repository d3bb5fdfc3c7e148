//! Request accounting counters
//!
//! Monotonic request / error totals plus the instant counting started.
//! Accounting and snapshots hold the shared side of `gate`, reset holds the
//! exclusive side, so a reset never lands between the request and error
//! increments of one failure and every snapshot satisfies `errors <= requests`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RequestCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    started_at: Mutex<Instant>,
    gate: RwLock<()>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub errors: u64,
}

impl CounterSnapshot {
    /// `100 * errors / requests`, or 0.0 before the first request
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        100.0 * self.errors as f64 / self.requests as f64
    }
}

impl Default for RequestCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCounters {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Mutex::new(Instant::now()),
            gate: RwLock::new(()),
        }
    }

    pub fn increment_request(&self) {
        let _gate = self.shared();
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_error(&self) {
        let _gate = self.shared();
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let _gate = self.shared();
        let errors = self.errors.load(Ordering::SeqCst);
        let requests = self.requests.load(Ordering::SeqCst);
        CounterSnapshot { requests, errors }
    }

    pub fn error_rate(&self) -> f64 {
        self.snapshot().error_rate()
    }

    /// Time since process start (or since the last reset)
    pub fn elapsed(&self) -> Duration {
        self.start_instant().elapsed()
    }

    pub fn requests_per_second(&self) -> f64 {
        rate_per_second(self.requests_total(), self.elapsed())
    }

    /// Zero both counters and restart the clock (operator/test reset only)
    pub fn reset(&self) {
        self.reset_with(|| {});
    }

    /// Reset, running `also` inside the same exclusive section
    ///
    /// `also` must not touch these counters.
    pub fn reset_with<F: FnOnce()>(&self, also: F) {
        let _gate = self.exclusive();
        let mut started_at = self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.errors.store(0, Ordering::SeqCst);
        self.requests.store(0, Ordering::SeqCst);
        *started_at = Instant::now();
        also();
    }

    fn record_failure(&self) {
        let _gate = self.shared();
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_instant(&self) -> Instant {
        *self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `count / elapsed`, 0.0 when no time has passed
pub fn rate_per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    count as f64 / secs
}

/// Single accounting point for one request
///
/// Resolving consumes the ticket; an unresolved ticket accounts itself as a
/// failure when dropped. Either way the request is counted exactly once.
#[derive(Debug)]
pub struct RequestTicket {
    counters: Arc<RequestCounters>,
    resolved: bool,
}

impl RequestTicket {
    pub fn new(counters: Arc<RequestCounters>) -> Self {
        Self {
            counters,
            resolved: false,
        }
    }

    pub fn succeed(self) {
        self.succeed_with(|| {});
    }

    /// Count a success and run `record` before a concurrent reset can
    /// observe the new request total
    ///
    /// `record` must not touch these counters.
    pub fn succeed_with<F: FnOnce()>(mut self, record: F) {
        self.resolved = true;
        let _gate = self.counters.shared();
        self.counters.requests.fetch_add(1, Ordering::SeqCst);
        record();
    }

    pub fn fail(mut self) {
        self.resolved = true;
        self.counters.record_failure();
    }
}

impl Drop for RequestTicket {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!("Request abandoned before completion, counting as error");
            self.counters.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_zero_without_requests() {
        let counters = RequestCounters::new();
        assert_eq!(counters.error_rate(), 0.0);
    }

    #[test]
    fn test_error_rate_exact_for_integer_inputs() {
        let counters = RequestCounters::new();
        for _ in 0..10 {
            counters.increment_request();
        }
        for _ in 0..3 {
            counters.increment_error();
        }
        assert_eq!(counters.error_rate(), 30.0);
    }

    #[test]
    fn test_rate_per_second_handles_zero_elapsed() {
        assert_eq!(rate_per_second(10, Duration::ZERO), 0.0);
        assert_eq!(rate_per_second(10, Duration::from_secs(5)), 2.0);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let counters = RequestCounters::new();
        counters.increment_request();
        counters.increment_error();
        counters.reset();

        assert_eq!(counters.snapshot(), CounterSnapshot { requests: 0, errors: 0 });
        assert_eq!(counters.error_rate(), 0.0);
    }

    #[test]
    fn test_ticket_success_counts_request_only() {
        let counters = Arc::new(RequestCounters::new());
        RequestTicket::new(counters.clone()).succeed();

        assert_eq!(counters.snapshot(), CounterSnapshot { requests: 1, errors: 0 });
    }

    #[test]
    fn test_ticket_failure_counts_once() {
        let counters = Arc::new(RequestCounters::new());
        RequestTicket::new(counters.clone()).fail();

        assert_eq!(counters.snapshot(), CounterSnapshot { requests: 1, errors: 1 });
    }

    #[test]
    fn test_dropped_ticket_counts_as_single_failure() {
        let counters = Arc::new(RequestCounters::new());
        {
            let _ticket = RequestTicket::new(counters.clone());
        }
        assert_eq!(counters.snapshot(), CounterSnapshot { requests: 1, errors: 1 });
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counters = Arc::new(RequestCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let ticket = RequestTicket::new(counters.clone());
                        if i % 4 == 0 {
                            ticket.fail();
                        } else {
                            ticket.succeed();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests, 8000);
        assert_eq!(snapshot.errors, 2000);
        assert_eq!(snapshot.error_rate(), 25.0);
    }

    #[test]
    fn test_reset_during_failures_keeps_errors_within_requests() {
        let counters = Arc::new(RequestCounters::new());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = counters.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        RequestTicket::new(counters.clone()).fail();
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            counters.reset();
            let snapshot = counters.snapshot();
            assert!(
                snapshot.errors <= snapshot.requests,
                "errors {} exceed requests {}",
                snapshot.errors,
                snapshot.requests
            );
        }

        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.errors, snapshot.requests);
    }

    #[test]
    fn test_success_record_runs_inside_accounting() {
        let counters = Arc::new(RequestCounters::new());
        let mut seen = 0;
        RequestTicket::new(counters.clone()).succeed_with(|| seen = counters.requests_total());

        assert_eq!(seen, 1);
        assert_eq!(counters.snapshot(), CounterSnapshot { requests: 1, errors: 0 });
    }
}
