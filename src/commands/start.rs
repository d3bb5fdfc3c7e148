use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use titanic_api::{config, logging, server, telemetry::SpanExportLayer};
use tracing::info;

/// Execute the start command
///
/// This will:
/// 1. Load configuration and apply CLI overrides
/// 2. Initialize logging and span capture (held until the server exits)
/// 3. Start the server
pub async fn execute(config_path: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut cfg = config::load_config(config_path)?;
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }

    let (span_layer, span_queue) = if cfg.telemetry.enabled {
        let (layer, queue) = SpanExportLayer::new(cfg.telemetry.trace_queue_size);
        (Some(layer), Some(queue))
    } else {
        (None, None)
    };
    let _log_guards = logging::init_logging(&cfg.logging, span_layer)?;

    println!(
        "{} {}:{}",
        "Starting titanic-api on".green(),
        cfg.server.host,
        cfg.server.port
    );
    info!(
        config = %config_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting titanic-api"
    );

    // Blocks until shutdown
    server::start_server(cfg, span_queue).await
}
