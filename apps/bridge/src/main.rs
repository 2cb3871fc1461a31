//! HmIP bridge binary.
//!
//! # Commands
//!
//! - `serve` - hub session plus the local HTTP API
//! - `connect` - hub session only, logging device state updates
//! - `activate` - trade an activation key for an auth token

mod activate;
mod app;
mod config;
mod http;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::BridgeConfig;

#[derive(Parser)]
#[command(name = "hmip-bridge")]
#[command(version)]
#[command(about = "Bridge between an HmIP hub and a local HTTP API", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/hmip-bridge/bridge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the hub and serve the HTTP API
    Serve,

    /// Connect to the hub without the HTTP API
    Connect,

    /// Request and store an auth token using the key shown in the hub's app
    Activate {
        /// Activation key
        #[arg(short, long)]
        key: String,

        /// Replace an existing auth token
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let cfg = BridgeConfig::load(&config_path)?;

    let _log_guard = logging::init(&cfg.log_level, cfg.log_file.as_deref())?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Commands::Serve => app::serve(cfg).await,
        Commands::Connect => app::connect(cfg).await,
        Commands::Activate { key, force } => app::activate(cfg, &config_path, &key, force).await,
    }
}
