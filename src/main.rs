use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, Backend};
use services::{
    disk_store::{self, DiskStore},
    gatekeeper::Gatekeeper,
    memory_store::MemoryStore,
    storage::ObjectStore,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-gate with config: {:?}", cfg);

    // --- Handle migration mode ---
    if migrate {
        let db = DiskStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("connecting to {}", cfg.database_url))?;
        disk_store::migrate(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize store ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::Memory => {
            tracing::warn!("Using in-memory store; objects are lost on restart");
            Arc::new(MemoryStore::new())
        }
        Backend::Disk => {
            let store = DiskStore::open(&cfg.database_url, &cfg.storage_dir)
                .await
                .with_context(|| {
                    format!(
                        "opening disk store at {} ({})",
                        cfg.storage_dir, cfg.database_url
                    )
                })?;
            tracing::info!("Disk store ready at {}", cfg.storage_dir);
            Arc::new(store)
        }
    };

    let state = AppState::new(store, Gatekeeper::new(cfg.auth_key.clone()));

    // --- Health listener (optional) ---
    if let Some(health_addr) = cfg.health_addr() {
        let health_app: Router = routes::routes::health_routes().with_state(state.clone());
        let listener = bind(&health_addr, &cfg).await?;
        tracing::info!("Health probes on http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, health_app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                tracing::error!("health listener failed: {}", err);
            }
        });
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let listener = bind(&cfg.addr(), &cfg).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Bind `addr`, falling back to loopback when a wildcard bind is refused.
async fn bind(addr: &str, cfg: &AppConfig) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let port = addr.rsplit(':').next().unwrap_or_default();
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err).with_context(|| format!("binding {}", addr)),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl-C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
    tracing::info!("Shutdown signal received");
}
