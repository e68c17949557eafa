use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use glasswire_core::config::{Config, SurfaceConfig};
use glasswire_gateway::{GatewayState, RelayBackends};
use glasswire_providers::ollama::{OllamaChat, OllamaGenerate};
use glasswire_surface::{LaunchOptions, SurfaceEngine, snapshot};

mod logging;

#[derive(Parser)]
#[command(
    name = "glasswire",
    about = "Live browser surface feeds and a local-model token relay over HTTP and WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Capture one PNG of the snapshot page and write it to disk
    Snapshot {
        /// Output file
        #[arg(short, long, default_value = "snapshot.png")]
        out: PathBuf,

        /// Page to capture instead of the configured snapshot URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Query a running gateway's health endpoint
    Status {
        /// Gateway port (default: configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration, defaults included
    Show,
    /// Get a config value by dotted path (e.g. capture.fast.fps)
    Get { key: String },
    /// Check the configuration for mistakes
    Validate,
}

#[cfg_attr(not(feature = "browser"), allow(unused_variables))]
fn build_engine(config: &SurfaceConfig) -> Arc<dyn SurfaceEngine> {
    #[cfg(feature = "browser")]
    {
        Arc::new(glasswire_surface::chromium::ChromiumEngine::new(config))
    }
    #[cfg(not(feature = "browser"))]
    {
        tracing::warn!("Built without the `browser` feature; surface requests will fail");
        Arc::new(glasswire_surface::engine::UnavailableEngine)
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("Config: {warning}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }

    let port = port.unwrap_or_else(|| config.gateway_port());
    let backends_config = config.backends();
    let backends = RelayBackends::new(
        Arc::new(OllamaChat::new(&backends_config.primary)),
        Arc::new(OllamaGenerate::new(&backends_config.secondary)),
        &backends_config,
    );
    let engine = build_engine(&config.surface());

    tracing::info!(
        primary = %backends_config.primary.base_url,
        model = %backends_config.primary.model,
        engine = engine.name(),
        "Starting Glasswire gateway on port {port}"
    );

    let state = GatewayState::new(config, engine, backends);

    #[cfg(feature = "metrics")]
    let state = match glasswire_gateway::metrics::install_prometheus_recorder() {
        Ok(handle) => state.with_metrics(handle),
        Err(e) => {
            tracing::warn!(%e, "Prometheus recorder unavailable; /metrics disabled");
            state
        }
    };

    glasswire_gateway::start_gateway(Arc::new(state), port).await
}

async fn take_snapshot(config: &Config, out: PathBuf, url: Option<String>) -> anyhow::Result<()> {
    let surface = config.surface();
    let engine = build_engine(&surface);
    let mut options = LaunchOptions::snapshot(&surface);
    if let Some(url) = url {
        options.url = url;
    }

    let frame = snapshot::single_shot(engine.as_ref(), &options).await?;
    tokio::fs::write(&out, &frame.data).await?;
    println!("Wrote {} bytes to {}", frame.data.len(), out.display());
    Ok(())
}

async fn status(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or_else(|| config.gateway_port());
    let url = format!("http://127.0.0.1:{port}/health");
    match reqwest::get(&url).await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(e) => {
            println!("Glasswire v{}", env!("CARGO_PKG_VERSION"));
            println!("Gateway on port {port}: not running ({e})");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(&config.logging(), cli.verbose)?;
    tracing::debug!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Snapshot { out, url } => take_snapshot(&config, out, url).await?,
        Commands::Status { port } => status(&config, port).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config.resolved())?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}
