//! hoard server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use hoard_core::config::AppConfig;
use hoard_server::bootstrap::{open_when_connected, spawn_sweep_scheduler};
use hoard_server::{AppState, create_router};
use std::future::IntoFuture;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hoard - A chunked blob store
#[derive(Parser, Debug)]
#[command(name = "hoardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "HOARD_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration: built-in defaults, then the TOML file if present,
/// then `HOARD_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HOARD_").split("__").ignore(&["config"]))
        .extract()
        .context("failed to load configuration")?;

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("hoard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    // Register Prometheus metrics
    hoard_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // The router answers 503 until the backend is connected.
    let state = AppState::new(config.clone());
    let engine = state.engine.clone();
    let app = create_router(state);

    let connect_engine = engine.clone();
    let connect_config = config.clone();
    let mut connect = tokio::spawn(async move {
        open_when_connected(&connect_engine, &connect_config).await
    });

    if config.sweep.enabled {
        let _sweep_handle = spawn_sweep_scheduler(engine.clone(), config.sweep.clone());
    } else {
        tracing::info!("Orphan sweep disabled");
    }

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Listening on {}", addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result.context("server error")?,
        joined = &mut connect => {
            joined
                .context("backend connection task failed")?
                .context("could not connect to the storage backend")?;
            // Connected; keep serving until shutdown.
            server.await.context("server error")?;
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
