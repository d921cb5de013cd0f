//! Command-line interface for Teleport tunnel provisioning.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use teleport_core::config::{ConfigError, TeleportConfig};
use teleport_core::connect::{ConnectError, Connector};
use teleport_core::wg::{self, WgError};

/// Teleport tunnel provisioning client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands
#[derive(Subcommand)]
enum Commands {
    /// Establish a tunnel and emit its WireGuard configuration
    Connect {
        /// Profile name for this router
        profile: String,

        /// One-time pairing PIN; omit to reconnect with the saved token
        #[arg(short, long)]
        pin: Option<String>,

        /// Save the config under the configured directory instead of
        /// printing it
        #[arg(short, long)]
        write: bool,
    },
    /// Print a previously saved tunnel configuration
    Show {
        /// Profile name for this router
        profile: String,
    },
}

/// Error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection attempt failed
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    /// Config file handling failed
    #[error("config file error: {0}")]
    Wg(#[from] WgError),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Run the CLI application
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TeleportConfig::load(path)?,
        None => match TeleportConfig::default_path() {
            Some(path) => TeleportConfig::load_or_default(path)?,
            None => TeleportConfig::default(),
        },
    };
    debug!(api_base = %config.api_base, "configuration loaded");

    match cli.command {
        Commands::Connect {
            profile,
            pin,
            write,
        } => {
            let connector = Connector::new(config.clone())?;
            let result = connector.connect(&profile, pin.as_deref()).await?;

            if write {
                wg::save_config(&config.config_dir, &result.config)?;
                info!(
                    profile = %profile,
                    path = %config.config_dir.join(format!("{profile}.conf")).display(),
                    "tunnel configuration saved"
                );
            } else {
                println!("{}", result.render());
            }
        }
        Commands::Show { profile } => {
            let iface = wg::load_config(&config.config_dir, &profile)?;
            println!("{}", iface.render());
        }
    }

    Ok(())
}
