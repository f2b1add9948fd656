//! tankwatch-wh - warehouse inventory service
//!
//! Serves the tank view, branch freshness rollups, bulk level updates and
//! CSV templates to admin and warehouse staff.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tankwatch_common::config::{resolve_root_folder, StoreKind, TomlConfig};
use tankwatch_wh::service::InventoryService;
use tankwatch_wh::store::{InMemoryStore, InventoryStore, SqliteStore};
use tankwatch_wh::{build_router, AppState};
use tokio::signal;
use tracing::info;

/// Command-line arguments for tankwatch-wh
#[derive(Parser, Debug)]
#[command(name = "tankwatch-wh")]
#[command(about = "Warehouse oil-tank inventory service")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "TANKWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "TANKWATCH_PORT")]
    port: Option<u16>,

    /// Persistence backend: sqlite or memory (overrides the config file)
    #[arg(long, env = "TANKWATCH_STORE")]
    store: Option<StoreKind>,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(store) = args.store {
        config.store = store;
    }

    init_tracing(&config)?;

    info!(
        "Starting tankwatch warehouse service (tankwatch-wh) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store: Arc<dyn InventoryStore> = match config.store {
        StoreKind::Sqlite => {
            let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
            let db_path = config.database_path_in(&root_folder);
            info!("Database path: {}", db_path.display());

            let store = SqliteStore::open(&db_path)
                .await
                .context("Failed to open database")?;
            info!("✓ Connected to database");
            Arc::new(store)
        }
        StoreKind::Memory => {
            info!("Using in-memory store (data is lost on exit)");
            Arc::new(InMemoryStore::new())
        }
    };

    if !config.inventory.role_gating {
        info!("Role gating disabled: all requests act as admin");
    }

    let service = Arc::new(InventoryService::new(
        store,
        config.inventory.update_log_limit,
    ));
    let app = build_router(AppState::new(service, config.inventory.role_gating));

    let addr: SocketAddr = format!("{}:{}", config.bind_host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("tankwatch-wh listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
