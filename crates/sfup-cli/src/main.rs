//! SFUP server
//!
//! Single-use File UPload: reserve a ticket, upload once, download once.

mod config;
mod error;
mod routes;
mod state;
mod sweeper;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

const DEFAULT_CONFIG: &str = "sfup.toml";

/// SFUP - one-shot encrypted file drop
#[derive(Parser)]
#[command(name = "sfup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,

        /// Data directory, overriding the configuration
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Public base URL, overriding the configuration
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Remove expired tickets once and exit
    Sweep {
        /// Data directory, overriding the configuration
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Output file, defaults to the configuration path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            data_dir,
            base_url,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(bind) = bind {
                config.server.listen_addr = bind;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if base_url.is_some() {
                config.server.base_url = base_url;
            }
            config.validate()?;
            init_logging(cli.verbose, &config.logging.level);
            serve(config).await?;
        }
        Commands::Sweep { data_dir } => {
            let mut config = load_config(&cli.config)?;
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            config.validate()?;
            init_logging(cli.verbose, &config.logging.level);
            let state = AppState::from_config(&config).await?;
            let swept = sweeper::run_once(&state.engine).await?;
            println!("Removed {swept} expired tickets");
        }
        Commands::InitConfig { output } => {
            init_logging(cli.verbose, "info");
            let path = output.unwrap_or(cli.config);
            if path.exists() {
                anyhow::bail!("Refusing to overwrite {}", path.display());
            }
            Config::default().save(&path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

/// Load configuration, falling back to defaults when the default file is absent.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path)
    } else if path == Path::new(DEFAULT_CONFIG) {
        Ok(Config::default())
    } else {
        Config::load(path) // Will fail with proper error
    }
}

/// Initialize logging; `RUST_LOG` takes precedence over the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Run the HTTP server until interrupted.
async fn serve(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    if state.engine.config().allowed_emails.is_empty() {
        tracing::warn!("No allowed emails configured, every reservation will be refused");
    }

    let sweeper = sweeper::spawn(state.engine.clone(), config.sweep_interval());

    let addr = config.parse_listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("SFUP v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
