//! Framecast Daemon - Main entry point
//!
//! Builds the simulation in the background and streams its frames to
//! WebSocket viewers, who can steer the shared camera.

mod api;
mod config;
mod control;
mod frame_loop;
mod server;
mod session;
mod state;
mod ws;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "framecast")]
#[command(about = "Streams a live physics simulation to browser viewers")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "framecast.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write the default configuration to the config path and exit
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

    info!("Framecast v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        return config::save_default_config(&args.config);
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        resolution = %config.resolution(),
        fps = config.stream.fps,
        max_frames = config.stream.max_frames,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone())?;
    server::run(state, &config.daemon.bind, config.daemon.tls.as_ref()).await?;

    info!("Framecast stopped");
    Ok(())
}
