use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use titanic_api::simulator::{Scenario, DEFAULT_BASE_URL};

#[derive(Parser, Debug)]
#[command(name = "titanic-api", version, about = "Titanic survival prediction service")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the prediction server (default)
    Start {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Drive synthetic traffic against a running server
    Simulate {
        #[command(subcommand)]
        scenario: SimulateCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SimulateCommands {
    /// Mixed workload: 80% predictions, 10% errors, 5% slow, 5% health checks
    Traffic(SimulateArgs),

    /// Burst of /simulate_error calls to trip the error-rate alert
    Errors(SimulateArgs),

    /// Edge-case passengers that tend to produce low confidence
    LowConfidence(SimulateArgs),
}

impl SimulateCommands {
    pub fn into_parts(self) -> (Scenario, SimulateArgs) {
        match self {
            Self::Traffic(args) => (Scenario::Traffic, args),
            Self::Errors(args) => (Scenario::Errors, args),
            Self::LowConfidence(args) => (Scenario::LowConfidence, args),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Base URL of the running server
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub url: String,

    /// Number of requests (scenario default when omitted)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Delay between requests in milliseconds (scenario default when omitted)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration (file + environment)
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start {
            host: None,
            port: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        match cli.get_command() {
            Commands::Start { host, port } => {
                assert!(host.is_none());
                assert!(port.is_none());
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_parsing_start_with_port() {
        let args = vec!["titanic-api", "start", "--port", "9000"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Start { port, .. } => assert_eq!(port, Some(9000)),
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_parsing_simulate() {
        let args = vec![
            "titanic-api",
            "simulate",
            "low-confidence",
            "--url",
            "http://127.0.0.1:9000",
            "-n",
            "6",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Simulate { scenario } => {
                let (scenario, args) = scenario.into_parts();
                assert_eq!(scenario, Scenario::LowConfidence);
                assert_eq!(args.url, "http://127.0.0.1:9000");
                assert_eq!(args.count, Some(6));
                assert!(args.interval_ms.is_none());
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_simulate_url_defaults_to_local_server() {
        let cli = Cli::try_parse_from(vec!["titanic-api", "simulate", "errors"]).unwrap();

        match cli.get_command() {
            Commands::Simulate { scenario } => {
                let (scenario, args) = scenario.into_parts();
                assert_eq!(scenario, Scenario::Errors);
                assert_eq!(args.url, DEFAULT_BASE_URL);
                assert!(args.count.is_none());
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parsing_global_config() {
        let args = vec!["titanic-api", "config", "validate", "--config", "prod.toml"];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        match cli.get_command() {
            Commands::Config { action } => {
                assert!(matches!(action, ConfigCommands::Validate));
            }
            _ => panic!("Expected Config command"),
        }
    }
}
