//! camlink CLI: viewer orchestrator and edge sender

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use camlink::config::{Config, EdgeConfig};
use camlink::edge::{DirectorySource, EdgeServer, FrameSource, PatternSource};
use camlink::SessionRegistry;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(about = "Resilient TCP camera streaming with stereo displacement estimation")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the configured cameras and report displacement
    Viewer,

    /// Serve frames to a viewer
    Edge {
        /// Listen address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Directory of JPEG files to stream (overrides config)
        #[arg(long)]
        directory: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!(config_path = %cli.config, "Loading configuration");
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Viewer => run_viewer(config).await,
        Command::Edge { bind, directory } => {
            let mut edge = config.edge;
            if let Some(bind) = bind {
                edge.bind = bind;
            }
            if directory.is_some() {
                edge.directory = directory;
            }
            run_edge(edge).await
        }
    }
}

/// Falls back to defaults when the file does not exist
fn load_config(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        warn!(config_path = %path, "Configuration file not found, using defaults");
        return Ok(Config::default());
    }

    Config::load(path).with_context(|| format!("failed to load {}", path))
}

async fn run_viewer(config: Config) -> Result<()> {
    info!(
        cameras = config.viewer.cameras.len(),
        wire_format = %config.viewer.wire_format,
        displacement = config.displacement.enabled,
        "Starting viewer"
    );

    let registry = SessionRegistry::start(&config).await;

    info!("Viewer running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    registry.shutdown().await;
    Ok(())
}

async fn run_edge(config: EdgeConfig) -> Result<()> {
    let source: Box<dyn FrameSource> = match &config.directory {
        Some(directory) => Box::new(DirectorySource::open(directory)?),
        None => {
            info!(width = config.width, height = config.height, "Streaming test pattern");
            Box::new(PatternSource::new(config.width, config.height, config.quality))
        }
    };

    let server = EdgeServer::bind(&config.bind, config.wire_format, config.fps).await?;
    let token = CancellationToken::new();
    let mut task = tokio::spawn(server.run(source, token.clone()));

    info!("Edge server running, press Ctrl+C to stop");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
            token.cancel();
            task.await??;
        }
        joined = &mut task => {
            if let Err(e) = joined? {
                error!(error = %e, "Edge server failed");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
