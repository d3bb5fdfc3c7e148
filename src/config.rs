use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::alerts::AlertThresholds;
use crate::stats::DEFAULT_WINDOW_CAPACITY;
use crate::telemetry::trace::{DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_SIZE};

/// Environment variable prefix, e.g. `TITANIC_API__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "TITANIC_API";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub alerts: AlertThresholds,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Optional append-only log file next to stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            service_name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_capacity")]
    pub capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: default_window_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Push metrics and spans to the collector; `/metrics` is served either way
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_collector_endpoint")]
    pub collector_endpoint: String,
    #[serde(default = "default_trace_endpoint")]
    pub trace_endpoint: String,
    /// Spans per pushed batch; batches are also flushed every export interval
    #[serde(default = "default_trace_batch_size")]
    pub trace_batch_size: usize,
    /// Closed spans buffered before new ones are dropped
    #[serde(default = "default_trace_queue_size")]
    pub trace_queue_size: usize,
    #[serde(default = "default_export_interval")]
    pub export_interval_seconds: u64,
    #[serde(default = "default_export_timeout")]
    pub export_timeout_seconds: u64,
    #[serde(default = "default_service_version")]
    pub service_version: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collector_endpoint: default_collector_endpoint(),
            trace_endpoint: default_trace_endpoint(),
            trace_batch_size: default_trace_batch_size(),
            trace_queue_size: default_trace_queue_size(),
            export_interval_seconds: default_export_interval(),
            export_timeout_seconds: default_export_timeout(),
            service_version: default_service_version(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    /// JSON coefficients file; built-in weights when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_service_name() -> String {
    "titanic-api".to_string()
}

fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_collector_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

fn default_trace_endpoint() -> String {
    "http://localhost:4318/v1/traces".to_string()
}

fn default_trace_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_trace_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_export_interval() -> u64 {
    5
}

fn default_export_timeout() -> u64 {
    3
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Load configuration from an optional TOML file layered under environment
/// variables, then validate it
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.window.capacity == 0 {
        anyhow::bail!("window.capacity must be greater than 0");
    }

    if cfg.telemetry.export_interval_seconds == 0 {
        anyhow::bail!("telemetry.export_interval_seconds must be greater than 0");
    }

    if cfg.telemetry.export_timeout_seconds == 0 {
        anyhow::bail!("telemetry.export_timeout_seconds must be greater than 0");
    }

    if cfg.telemetry.enabled && cfg.telemetry.collector_endpoint.trim().is_empty() {
        anyhow::bail!("telemetry.collector_endpoint is required when telemetry is enabled");
    }

    if cfg.telemetry.enabled && cfg.telemetry.trace_endpoint.trim().is_empty() {
        anyhow::bail!("telemetry.trace_endpoint is required when telemetry is enabled");
    }

    if cfg.telemetry.trace_batch_size == 0 || cfg.telemetry.trace_queue_size == 0 {
        anyhow::bail!("telemetry.trace_batch_size and telemetry.trace_queue_size must be greater than 0");
    }

    let alerts = &cfg.alerts;
    if !(0.0..=100.0).contains(&alerts.error_rate_threshold) {
        anyhow::bail!(
            "alerts.error_rate_threshold must be within [0, 100], got {}",
            alerts.error_rate_threshold
        );
    }

    for (name, value) in [
        ("low_confidence_threshold", alerts.low_confidence_threshold),
        ("high_confidence_threshold", alerts.high_confidence_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("alerts.{} must be within [0, 1], got {}", name, value);
        }
    }

    if alerts.low_confidence_threshold >= alerts.high_confidence_threshold {
        anyhow::bail!(
            "alerts.low_confidence_threshold ({}) must be below alerts.high_confidence_threshold ({})",
            alerts.low_confidence_threshold,
            alerts.high_confidence_threshold
        );
    }

    if cfg.logging.service_name.trim().is_empty() {
        anyhow::bail!("logging.service_name cannot be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = load_config(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.window.capacity, 20);
        assert_eq!(cfg.alerts.min_requests, 10);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.telemetry.export_interval_seconds, 5);
        assert_eq!(cfg.telemetry.trace_endpoint, "http://localhost:4318/v1/traces");
        assert_eq!(cfg.telemetry.trace_batch_size, 512);
        assert!(cfg.model.weights_path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
port = 9100

[logging]
format = "text"

[alerts]
error_rate_threshold = 25.0
min_requests = 4

[telemetry]
enabled = false
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert_eq!(cfg.alerts.error_rate_threshold, 25.0);
        assert_eq!(cfg.alerts.min_requests, 4);
        // Unset fields in a present section keep their defaults
        assert_eq!(cfg.alerts.low_confidence_threshold, 0.6);
        assert!(!cfg.telemetry.enabled);
    }

    #[test]
    fn test_environment_overrides_file() {
        std::env::set_var("TITANIC_API__SERVER__HOST", "127.0.0.9");
        let cfg = load_config(Path::new("does-not-exist.toml")).unwrap();
        std::env::remove_var("TITANIC_API__SERVER__HOST");
        assert_eq!(cfg.server.host, "127.0.0.9");
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut cfg = Config::default();
        cfg.window.capacity = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut cfg = Config::default();
        cfg.alerts.low_confidence_threshold = 0.95;
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("low_confidence_threshold"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_error_threshold() {
        let mut cfg = Config::default();
        cfg.alerts.error_rate_threshold = 150.0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut cfg = Config::default();
        cfg.telemetry.export_interval_seconds = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_trace_endpoint() {
        let mut cfg = Config::default();
        cfg.telemetry.trace_endpoint = " ".to_string();
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("trace_endpoint"));

        cfg.telemetry.enabled = false;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }
}
