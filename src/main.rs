use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start { host, port } => {
            commands::start::execute(&args.config, host, port).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Simulate { scenario } => {
            let (scenario, opts) = scenario.into_parts();
            commands::simulate::execute(scenario, &opts.url, opts.count, opts.interval_ms).await?;
        }
        cli::Commands::Version => {
            println!("titanic-api v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
