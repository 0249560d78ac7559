//! SATP gateway binary.
//!
//! Subcommands: init (write a config scaffold), start (run the gateway).

mod config;
mod gateway;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use satp_recovery::InMemoryBridgeManager;

use crate::config::GatewayConfig;
use crate::gateway::SatpGateway;

/// SATP gateway: crash-recoverable cross-chain asset transfers.
#[derive(Parser, Debug)]
#[command(name = "satp-gateway", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init {
        /// Path for the new config file.
        #[arg(short, long, default_value = "satp-gateway.toml")]
        config: PathBuf,
    },
    /// Start the gateway.
    Start {
        /// Path to the config file.
        #[arg(short, long, default_value = "satp-gateway.toml")]
        config: PathBuf,

        /// Override the gateway-to-gateway port.
        #[arg(long)]
        port: Option<u16>,

        /// Override the log level.
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { config } => {
            if config.exists() {
                anyhow::bail!("refusing to overwrite existing config at {}", config.display());
            }
            GatewayConfig::default().save(&config)?;
            println!("wrote default configuration to {}", config.display());
            Ok(())
        }
        Commands::Start {
            config,
            port,
            log_level,
        } => {
            let mut config = GatewayConfig::load(&config)?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(level) = log_level {
                config.log_level = level;
            }

            init_tracing(&config.log_level);

            // Ledger connectors are pluggable collaborators; the in-process
            // bridge stands in until a connector-backed one is registered.
            let bridge = Arc::new(InMemoryBridgeManager::new());
            let mut gateway = SatpGateway::new(config, bridge)?;
            gateway.start().await?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupt received");
            gateway.shutdown().await;
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
