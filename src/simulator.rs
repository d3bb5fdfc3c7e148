//! Synthetic traffic against a running server
//!
//! Three scenarios exercise the alerting path end to end: a burst of
//! `/simulate_error` calls for the error-rate alert, edge-case passengers for
//! the low-confidence alert, and a mixed workload of predictions, errors,
//! slow requests and health checks.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::AlertThresholds;
use crate::models::PredictionRequest;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Slow requests take up to 5s server-side
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Traffic,
    Errors,
    LowConfidence,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::Errors => "errors",
            Self::LowConfidence => "low-confidence",
        }
    }

    pub fn default_count(self) -> usize {
        match self {
            // Five minutes at three requests per second
            Self::Traffic => 900,
            Self::Errors => 20,
            Self::LowConfidence => edge_cases().len(),
        }
    }

    pub fn default_interval(self) -> Duration {
        match self {
            Self::Traffic => Duration::from_millis(333),
            Self::Errors => Duration::from_millis(500),
            Self::LowConfidence => Duration::from_secs(1),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request of the mixed workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Predict,
    Error,
    Slow,
    Health,
}

impl TrafficKind {
    /// 80% predictions, 10% errors, 5% slow requests, 5% health checks
    pub fn pick(roll: f64) -> Self {
        if roll < 0.80 {
            Self::Predict
        } else if roll < 0.90 {
            Self::Error
        } else if roll < 0.95 {
            Self::Slow
        } else {
            Self::Health
        }
    }
}

/// Passengers near the decision boundary
pub fn edge_cases() -> Vec<PredictionRequest> {
    vec![
        passenger(3, "male", 50.0, 0, 0, 5.0, "S"),
        passenger(1, "female", 2.0, 1, 2, 151.55, "S"),
        passenger(2, "male", 45.0, 1, 1, 25.0, "Q"),
    ]
}

/// Uniformly random, always valid passenger
pub fn random_passenger<R: Rng>(rng: &mut R) -> PredictionRequest {
    let fare: f64 = rng.gen_range(5.0..500.0);
    passenger(
        rng.gen_range(1..=3),
        ["male", "female"][rng.gen_range(0..2)],
        rng.gen_range(1..=80) as f64,
        rng.gen_range(0..=3),
        rng.gen_range(0..=2),
        (fare * 100.0).round() / 100.0,
        ["C", "Q", "S"][rng.gen_range(0..3)],
    )
}

fn passenger(
    pclass: i64,
    sex: &str,
    age: f64,
    sib_sp: i64,
    parch: i64,
    fare: f64,
    embarked: &str,
) -> PredictionRequest {
    PredictionRequest {
        pclass,
        sex: sex.to_string(),
        age,
        sib_sp,
        parch,
        fare,
        embarked: embarked.to_string(),
    }
}

/// Tally of one simulation run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulationReport {
    pub sent: usize,
    /// 2xx responses
    pub succeeded: usize,
    /// Non-2xx responses
    pub rejected: usize,
    /// Transport failures (connection refused, timeout)
    pub unreachable: usize,
    /// Predictions answered below the low-confidence threshold
    pub low_confidence: usize,
}

#[derive(Debug, Deserialize)]
struct PredictionReply {
    prediction: String,
    confidence: f64,
}

struct Reply {
    status: StatusCode,
    confidence: Option<f64>,
}

pub struct TrafficSimulator {
    client: Client,
    base_url: String,
    interval: Duration,
    low_confidence_threshold: f64,
}

impl TrafficSimulator {
    pub fn new(base_url: &str, interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            interval,
            low_confidence_threshold: AlertThresholds::default().low_confidence_threshold,
        })
    }

    /// Send `count` requests of `scenario`, pacing them by the interval
    pub async fn run(&self, scenario: Scenario, count: usize) -> Result<SimulationReport> {
        info!(scenario = %scenario, count, base_url = %self.base_url, "Simulation started");

        let report = match scenario {
            Scenario::Errors => self.run_errors(count).await,
            Scenario::LowConfidence => self.run_low_confidence(count).await,
            Scenario::Traffic => self.run_traffic(count).await?,
        };

        info!(
            scenario = %scenario,
            sent = report.sent,
            succeeded = report.succeeded,
            rejected = report.rejected,
            unreachable = report.unreachable,
            "Simulation completed"
        );
        Ok(report)
    }

    async fn run_errors(&self, count: usize) -> SimulationReport {
        let mut report = SimulationReport::default();
        for i in 0..count {
            self.pace(i).await;
            let reply = self.get("/simulate_error").await;
            self.tally(&mut report, "/simulate_error", reply);
        }
        report
    }

    async fn run_low_confidence(&self, count: usize) -> SimulationReport {
        let mut report = SimulationReport::default();
        for (i, passenger) in edge_cases().iter().cycle().take(count).enumerate() {
            self.pace(i).await;
            let reply = self.predict(passenger).await;
            self.tally(&mut report, "/predict", reply);
        }
        report
    }

    async fn run_traffic(&self, count: usize) -> Result<SimulationReport> {
        let health = self
            .get("/health")
            .await
            .with_context(|| format!("Cannot connect to {}", self.base_url))?;
        if !health.status.is_success() {
            anyhow::bail!("Health check failed with status {}", health.status);
        }

        let mut report = SimulationReport::default();
        for i in 0..count {
            self.pace(i).await;
            let (path, reply) = match TrafficKind::pick(rand::random()) {
                TrafficKind::Predict => {
                    let passenger = random_passenger(&mut rand::thread_rng());
                    ("/predict", self.predict(&passenger).await)
                }
                TrafficKind::Error => ("/simulate_error", self.get("/simulate_error").await),
                TrafficKind::Slow => ("/simulate_slow", self.get("/simulate_slow").await),
                TrafficKind::Health => ("/health", self.get("/health").await),
            };
            self.tally(&mut report, path, reply);

            if report.sent % 20 == 0 {
                info!(sent = report.sent, "Simulation progress");
            }
        }
        Ok(report)
    }

    async fn pace(&self, index: usize) {
        if index > 0 && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Reply, reqwest::Error> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(Reply {
            status: response.status(),
            confidence: None,
        })
    }

    async fn predict(&self, passenger: &PredictionRequest) -> Result<Reply, reqwest::Error> {
        let response = self
            .client
            .post(self.url("/predict"))
            .json(passenger)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(Reply {
                status,
                confidence: None,
            });
        }

        let reply: PredictionReply = response.json().await?;
        debug!(prediction = %reply.prediction, confidence = reply.confidence, "Prediction received");
        Ok(Reply {
            status,
            confidence: Some(reply.confidence),
        })
    }

    fn tally(&self, report: &mut SimulationReport, path: &str, reply: Result<Reply, reqwest::Error>) {
        report.sent += 1;
        match reply {
            Ok(reply) if reply.status.is_success() => {
                report.succeeded += 1;
                if reply
                    .confidence
                    .is_some_and(|c| c < self.low_confidence_threshold)
                {
                    report.low_confidence += 1;
                }
            }
            Ok(reply) => {
                debug!(path, status = reply.status.as_u16(), "Request rejected");
                report.rejected += 1;
            }
            Err(e) => {
                warn!(path, error = %e, "Request failed");
                report.unreachable += 1;
            }
        }
    }
}
