use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use titanic_api::config::{self, Config};

/// Execute the config show command
///
/// Prints the effective configuration after file and environment layering
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(&cfg)?);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    for line in summary(&cfg) {
        println!("  {}", line);
    }

    Ok(())
}

fn summary(cfg: &Config) -> Vec<String> {
    let telemetry = if cfg.telemetry.enabled {
        format!(
            "metrics to {}, spans to {}, every {}s",
            cfg.telemetry.collector_endpoint,
            cfg.telemetry.trace_endpoint,
            cfg.telemetry.export_interval_seconds
        )
    } else {
        "push disabled".to_string()
    };

    vec![
        format!("Listen: {}:{}", cfg.server.host, cfg.server.port),
        format!("Window capacity: {}", cfg.window.capacity),
        format!(
            "Error-rate alert: > {}% after {} requests",
            cfg.alerts.error_rate_threshold, cfg.alerts.min_requests
        ),
        format!(
            "Confidence bands: low < {}, high > {}",
            cfg.alerts.low_confidence_threshold, cfg.alerts.high_confidence_threshold
        ),
        format!("Telemetry: {}", telemetry),
        format!(
            "Model: {}",
            cfg.model
                .weights_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in weights".to_string())
        ),
    ]
}
