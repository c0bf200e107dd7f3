//! Shutter server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use shutter_core::config::AppConfig;
use shutter_ml::{ClipSearchClient, SemanticSearch};
use shutter_server::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shutter - an image cloud storage server
#[derive(Parser, Debug)]
#[command(name = "shutterd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SHUTTER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Shutter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("SHUTTER_") && key != "SHUTTER_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: shutterd --config /path/to/config.toml\n  \
             2. Environment variables: SHUTTER_SERVER__BIND=0.0.0.0:8080 \
             SHUTTER_AUTH__TOKEN_SECRET=change-me shutterd\n\n\
             See config/server.example.toml for example configuration."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHUTTER_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize storage and verify connectivity before accepting
    // requests, so misconfiguration surfaces at startup.
    let storage = shutter_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = shutter_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let search: Arc<dyn SemanticSearch> = Arc::new(
        ClipSearchClient::new(config.search.clone(), storage.clone())
            .map_err(|e| anyhow::anyhow!("failed to initialize search client: {e}"))?,
    );
    tracing::info!(url = %config.search.url, "Search client initialized");

    let platform = match &config.platform {
        Some(platform_config) => {
            let platform = shutter_ml::platform_from_config(platform_config)
                .await
                .map_err(|e| anyhow::anyhow!("failed to initialize training platform: {e}"))?;
            tracing::info!("Training platform initialized");
            Some(platform)
        }
        None => {
            tracing::warn!("No training platform configured, training routes disabled");
            None
        }
    };

    let state = AppState::new(config.clone(), storage, metadata, search, platform);

    // The tracker picks pending poll jobs straight back up after a
    // restart; nothing to recover beyond starting the worker.
    if let Some(tracker) = &state.tracker {
        let tracker = tracker.clone();
        tokio::spawn(tracker.run());
        tracing::info!(
            interval_secs = config.poller.interval_secs,
            "Job tracker worker spawned"
        );
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
