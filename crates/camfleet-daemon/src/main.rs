//! camfleet Daemon - Main entry point
//!
//! Serves the REST API the fleet dashboard uses to inspect devices, edit
//! application settings and geometry, capture photos and manage Wi-Fi.

mod api;
mod config;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "camfleet")]
#[command(about = "Settings and photo backend for an AI camera fleet")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camfleet.toml")]
    config: PathBuf,

    /// Bind address for the REST API
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// List every device once and exit
    #[arg(long)]
    list_once: bool,

    /// Write a configuration template to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("camfleet v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        if args.config.exists() {
            anyhow::bail!("{} already exists", args.config.display());
        }
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        registry = %config.registry.base_url,
        groups = config.groups.len(),
        "Configuration loaded"
    );

    // Create application state
    let state = state::AppState::new(config.clone())?;

    if args.list_once {
        let devices = state.fleet.list_all(true).await?;
        println!("Found {} devices:", devices.len());
        for entry in devices {
            let device = &entry.device;
            let kind = state
                .classify(device)
                .map(|k| k.label())
                .unwrap_or_else(|| "no application".to_string());
            println!(
                "  - {} ({}) group {} [{:?}]",
                device.name(),
                device.id,
                entry.group_id,
                device.foundness()
            );
            println!("    Application: {}", kind);
            if let Some(seen) = device.last_updated() {
                println!("    Last update: {}", seen.to_rfc3339());
            }
        }
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
