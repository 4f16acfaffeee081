use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::ShellBackend;
use crate::config::Config;
use crate::secrets::EnvSecretProvider;
use crate::service::Orchestrator;
use crate::store::{MemoryStore, PgStore, Store};

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod queue;
pub mod secrets;
pub mod service;
pub mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sluice Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, pipeline state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let backend = Arc::new(ShellBackend::new(
        config.workspace.clone(),
        config.step_timeout,
    ));
    let secrets = EnvSecretProvider::from_env();
    tracing::info!("Loaded {} secrets", secrets.len());

    let orchestrator = Orchestrator::new(store, backend, Arc::new(secrets), config.queue_capacity);
    orchestrator.start(config.workers)?;

    // Build router with all API endpoints
    let app = api::create_router(orchestrator.clone());

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining queue");
}
