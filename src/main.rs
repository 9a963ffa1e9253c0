//! Paper-trading engine daemon and CLI
//!
//! All trades are simulated against real-market quotes; no funds move.

use clap::{Parser, Subcommand};
use tracing::error;

use paperbot::cli::commands;
use paperbot::config::Config;

/// Autonomous paper-trading engine for on-chain DeFi tokens
#[derive(Parser)]
#[command(name = "paperbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cycles on the configured interval until interrupted
    Run,

    /// Run a single cycle for all users and exit
    Cycle,

    /// Show open positions, risk state and rolling performance
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Monte Carlo forward prediction from the 30d trade history
    Forecast {
        /// User to forecast for
        #[arg(default_value = "default")]
        user: String,

        /// Projection window in days
        #[arg(long, default_value_t = 7)]
        window: i64,
    },
}

#[tokio::main]
async fn main() {
    // .env is optional; real deployments configure through the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %cli.config, "configuration error");
            std::process::exit(commands::EXIT_CONFIG);
        }
    };

    let code = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Cycle => commands::cycle(&config).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => {
            if let Err(e) = commands::show_config(&config) {
                error!(error = %e, "failed to render config");
                commands::EXIT_CONFIG
            } else {
                commands::EXIT_OK
            }
        }
        Commands::Forecast { user, window } => commands::forecast(&config, &user, window).await,
    };

    std::process::exit(code);
}
