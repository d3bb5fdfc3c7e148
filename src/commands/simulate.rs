use anyhow::Result;
use colored::Colorize;
use std::time::Duration;
use titanic_api::simulator::{Scenario, SimulationReport, TrafficSimulator};

/// Execute the simulate command
///
/// Sends `count` requests of `scenario` to the server at `url`, then prints
/// how they were answered.
pub async fn execute(
    scenario: Scenario,
    url: &str,
    count: Option<usize>,
    interval_ms: Option<u64>,
) -> Result<()> {
    let count = count.unwrap_or_else(|| scenario.default_count());
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| scenario.default_interval());

    println!(
        "{} {} against {} ({} requests, {}ms apart)",
        "Simulating".yellow(),
        scenario.to_string().bold(),
        url,
        count,
        interval.as_millis()
    );

    let simulator = TrafficSimulator::new(url, interval)?;
    let report = simulator.run(scenario, count).await?;

    println!("{}", "✓ Simulation completed".green());
    println!();
    for line in summary(&report) {
        println!("  {}", line);
    }

    Ok(())
}

fn summary(report: &SimulationReport) -> Vec<String> {
    vec![
        format!("Sent: {}", report.sent),
        format!("Succeeded: {}", report.succeeded),
        format!("Rejected: {}", report.rejected),
        format!("Unreachable: {}", report.unreachable),
        format!("Low-confidence predictions: {}", report.low_confidence),
    ]
}
