use anyhow::Result;
use clap::{Parser, Subcommand};
use editor_hub::{api, config, import};
use editor_hub_core::{fetch::HttpFetcher, store::MemoryDocumentStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "editor-hub")]
#[command(about = "Bridges repository documents and an external document editor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve editor sessions, content and callbacks
    Serve {
        /// Listen address
        #[arg(short, long)]
        addr: Option<String>,

        /// Document store directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Import local files as a new document
    Import {
        /// One file for primary content, several for an attachment list
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        title: Option<String>,

        /// Track minor versions on every save
        #[arg(long)]
        versioned: bool,

        /// Document store directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config()?;

    match cli.command {
        Commands::Serve { addr, data_dir } => {
            if let Some(addr) = addr {
                config.addr = addr.parse()?;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            serve(config).await?;
        }
        Commands::Import {
            files,
            title,
            versioned,
            data_dir,
        } => {
            let store = MemoryDocumentStore::open(data_dir.unwrap_or(config.data_dir))?;
            let id = import::import_files(&store, &files, title, versioned).await?;
            println!("{id}");
        }
    }

    Ok(())
}

async fn serve(config: config::Config) -> Result<()> {
    let store = Arc::new(MemoryDocumentStore::open(&config.data_dir)?);
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    if config.access_secret_generated {
        warn!(
            data_dir = %config.data_dir.display(),
            "EDITOR_HUB_ACCESS_SECRET is not set, editors still open at restart cannot save"
        );
    }
    let state = api::AppState::new(&config, store, fetcher);
    if !state.authenticator.is_enabled() {
        warn!("EDITOR_HUB_JWT_SECRET is not set, callbacks are accepted without signature verification");
    }
    let app = api::router(state);

    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, public_url = %config.public_url, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
