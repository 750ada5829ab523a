//! Keeper server entry point.
//!
//! Bootstraps the storage backend and the vault service, then starts the
//! Axum HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use keeper_core::cipher::AtRestCipher;
use keeper_core::models::SupportedTypes;
use keeper_core::service::VaultService;
use keeper_storage::MemoryBackend;

use keeper_server::config::{ServerConfig, StorageBackendType};
use keeper_server::routes;
use keeper_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "Keeper starting");

    let state = build_app_state(&config).await?;
    let app = routes::router(state, config.max_body_bytes);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Keeper server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Keeper server stopped");
    Ok(())
}

/// Build the shared application state for the configured backend.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let cipher = AtRestCipher::new(&config.encryption_key);
    if !cipher.is_keyed() {
        warn!("KEEPER_ENCRYPTION_KEY is not set, record payloads are stored unencrypted");
    }
    let types = SupportedTypes::default();

    let service = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            VaultService::with_backend(MemoryBackend::new(), cipher, types)
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            let backend = keeper_storage::PostgresBackend::connect(
                url,
                keeper_storage::PoolSettings::default(),
            )
            .await
            .context("failed to connect to PostgreSQL storage")?;
            VaultService::with_backend(backend, cipher, types)
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!(
                "PostgreSQL backend requested but feature 'postgres-backend' is not enabled"
            );
        }
    };

    Ok(Arc::new(AppState { service }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
