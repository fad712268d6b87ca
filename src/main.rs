//! Claude Streams - Session logs as resumable, live-tailable streams.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_streams::config::{ConfigError, ConfigLoader, StreamsConfig};
use claude_streams::storage::{Storage, StorageError};
use claude_streams::transport::{ServerError, StreamServer};

#[derive(Parser)]
#[command(
    name = "claude-streams",
    about = "Serve Claude session logs as resumable, live-tailable streams",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to load instead of the default search paths.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, `host:port` or `:port` (all interfaces).
    /// Defaults to 127.0.0.1:8214.
    #[arg(long)]
    addr: Option<String>,

    /// Directory of session logs (defaults to ~/.claude).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Enable permissive CORS for browser development.
    #[arg(long)]
    dev: bool,

    /// Path prefix for all routes.
    #[arg(long)]
    base: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<StreamsConfig, ConfigError> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(dir) = &cli.dir {
        config.storage.dir = Some(dir.clone());
    }
    if let Some(addr) = &cli.addr {
        config.server.set_listen_addr(addr)?;
    }
    if let Some(base) = &cli.base {
        config.server.base_path.clone_from(base);
    }
    if cli.dev {
        config.server.cors_permissive = true;
    }

    Ok(config)
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;
    let dir = config.storage.resolved_dir()?;

    let storage = Arc::new(Storage::open(&dir, config.storage.clone()).await?);
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        }
    });

    let result = StreamServer::new(storage.clone(), cancel.clone())
        .with_config(config.server)
        .run()
        .await;
    cancel.cancel();

    match Arc::try_unwrap(storage) {
        Ok(storage) => storage.close().await,
        Err(_) => tracing::debug!("Storage still referenced at exit; dropping"),
    }

    Ok(result?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "claude-streams failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
