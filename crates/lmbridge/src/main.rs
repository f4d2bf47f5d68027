//! lmbridge daemon - Anthropic Messages API proxy for local LLM servers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lmbridge::config::{Config, load_config};
use lmbridge::error::Result;
use lmbridge::proxy::ProxyServer;

/// lmbridge - Serve the Anthropic Messages API from an OpenAI-compatible backend
#[derive(Parser)]
#[command(name = "lmbridge")]
#[command(about = "Serve the Anthropic Messages API from an OpenAI-compatible backend")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the config file (e.g. 0.0.0.0:8080)
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Backend base URL, overriding the config file (e.g. http://localhost:1234)
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the proxy server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let config = resolve_config(cli.config, cli.listen, cli.backend_url)?;
            serve(config).await
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lmbridge=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn resolve_config(
    config_path: Option<PathBuf>,
    listen: Option<String>,
    backend_url: Option<String>,
) -> Result<Config> {
    let mut config = load_config(config_path.as_deref())?;

    if let Some(listen) = listen {
        config.proxy.listen_addr = listen;
    }
    if let Some(backend_url) = backend_url {
        config.backend.url = backend_url;
    }

    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting lmbridge");

    let proxy = ProxyServer::new(config);
    proxy.serve().await?;

    tracing::info!("lmbridge stopped");
    Ok(())
}
