//! rhizome Router Server
//!
//! Runs a rhizome router with its WebSocket leg for web clients and its
//! OSC leg for desktop applications.

use anyhow::{Context, Result};
use clap::Parser;
use rhizome_router::{OscServerAdapter, OscServerConfig, Router, RouterConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rhizome")]
#[command(about = "rhizome router: OSC applications and web pages on one namespace")]
#[command(version)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket listen address
    #[arg(short, long)]
    web: Option<String>,

    /// OSC (UDP) listen address
    #[arg(short, long)]
    osc: Option<String>,

    /// Directory where blobs are stored
    #[arg(short, long)]
    blobs_dir: Option<PathBuf>,

    /// Maximum number of web clients, 0 for no limit
    #[arg(short, long)]
    max_connections: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<RouterConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => RouterConfig::default(),
    };

    if let Some(web) = &cli.web {
        config.web_bind = web.clone();
    }
    if let Some(osc) = &cli.osc {
        config.osc_bind = osc.clone();
    }
    if let Some(dir) = &cli.blobs_dir {
        config.blobs_dir = dir.clone();
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging, RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&cli)?;

    tracing::info!("Starting rhizome router '{}'", config.name);
    tracing::info!("Blobs stored in {}", config.blobs_dir.display());
    if config.max_connections > 0 {
        tracing::info!("Accepting at most {} web clients", config.max_connections);
    }

    let router = Router::new(config.clone()).context("starting router")?;

    let osc = OscServerAdapter::bind(OscServerConfig::from(&config), router.clone())
        .await
        .with_context(|| format!("binding OSC socket on {}", config.osc_bind))?;
    tracing::info!("OSC on {}", osc.local_addr()?);
    tracing::info!(
        "Web clients on ws://{} (default port {})",
        config.web_bind,
        rhizome_core::DEFAULT_WEB_PORT
    );

    let web = router.serve_websocket(&config.web_bind);
    let udp = osc.serve();
    tokio::pin!(web, udp);

    // Run until interrupted or a leg fails
    tokio::select! {
        result = &mut web => result.context("WebSocket server failed")?,
        result = &mut udp => result.context("OSC server failed")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    router.stop().await;
    Ok(())
}
