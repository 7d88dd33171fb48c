use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;

use plants_service::config::Config;
use plants_service::security::issue_token;
use plants_service::{comms, utils};

#[derive(Parser)]
#[command(name = "plants-service", version, about = "Plant catalogue API")]
struct AppCli {
    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a signed token for local testing
    Token {
        #[arg(long, default_value = "dev")]
        sub: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init();

    let args = AppCli::parse();
    let mut config = Config::from_env().context("loading configuration")?;

    match args.command {
        Some(Commands::Token { sub, ttl }) => {
            let token = issue_token(config.jwt_secret.as_bytes(), &sub, Duration::from_secs(ttl))?;
            println!("{token}");
        }
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.set_port(port);
            }
            info!(version = plants_service::VERSION, ?config, "starting plants service");
            comms::serve(config).await?;
        }
        None => {
            info!(version = plants_service::VERSION, ?config, "starting plants service");
            comms::serve(config).await?;
        }
    }

    Ok(())
}
