//! shipdocs-ingest - document ingestion service
//!
//! Analyses uploaded certificates, survey/test reports and crew documents, checks them
//! against the entity the user selected, and stores the original plus a merged summary
//! once the caller has created its record.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shipdocs_common::config::{
    default_config_path, read_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use shipdocs_common::events::EventBus;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipdocs_ingest::boundary::{HttpArtifactStore, HttpDocumentAnalyzer};
use shipdocs_ingest::config::IngestConfig;
use shipdocs_ingest::db::{init_database_pool, SqliteRecordLookup};
use shipdocs_ingest::{build_pipeline, build_router, AppState};

const MODULE_NAME: &str = "shipdocs-ingest";

/// Command-line arguments for shipdocs-ingest
#[derive(Parser, Debug)]
#[command(name = "shipdocs-ingest")]
#[command(about = "Document ingestion, extraction-fusion and verification service")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/shipdocs/shipdocs-ingest.toml)
    #[arg(short, long, env = "SHIPDOCS_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding shipdocs.db
    #[arg(short, long, env = "SHIPDOCS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "SHIPDOCS_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SHIPDOCS_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing exists; what happened is logged once the subscriber is up
    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let (toml_config, config_found, config_error) =
        match config_path.as_deref().map(read_toml_config) {
            Some(Ok(Some(config))) => (config, true, None),
            Some(Ok(None)) | None => (TomlConfig::default(), false, None),
            Some(Err(e)) => (TomlConfig::default(), false, Some(e)),
        };

    let (log_file, log_file_error) = match toml_config.logging.open_log_file() {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };
    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });

    // Initialize tracing; RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "shipdocs_ingest={level},shipdocs_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let Some(e) = config_error {
        return Err(e).context("Failed to load configuration");
    }
    match (&config_path, config_found) {
        (Some(path), true) => info!("Loaded configuration from {}", path.display()),
        (Some(path), false) => warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        ),
        (None, _) => warn!("No config directory on this platform, using built-in defaults"),
    }
    match (log_file_error, &toml_config.logging.file) {
        (Some(e), _) => warn!("Logging to stderr only: {}", e),
        (None, Some(path)) => info!("Also logging to {}", path.display()),
        (None, None) => {}
    }

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));

    let config = IngestConfig::resolve(&toml_config).context("Invalid configuration")?;

    // Root folder and database
    let root_folder = RootFolderResolver::new()
        .with_toml(&toml_config)
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = init_database_pool(&db_path).await?;

    // Boundaries
    let analyzer = HttpDocumentAnalyzer::new(&config.analysis)
        .context("Failed to build analysis boundary client")?;
    let store = HttpArtifactStore::new(&config.storage)
        .context("Failed to build storage boundary client")?;
    if !config.pipeline.pattern_reader_enabled {
        warn!("Pattern reader disabled; chunks will be AI-only");
    }

    let event_bus = EventBus::new(256);
    let pipeline = build_pipeline(&config, Arc::new(analyzer), event_bus);
    let state = AppState::new(
        config,
        pipeline,
        Arc::new(store),
        Arc::new(SqliteRecordLookup::new(db_pool)),
    );
    let app = build_router(state);

    let host = args.host.unwrap_or(toml_config.server.host);
    let port = args.port.unwrap_or(toml_config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
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
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
