use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_api::{app, AppState};
use turnstile_store::app_config::{Config, StorageBackend};
use turnstile_store::{DbClient, InMemoryStore, PgEventDirectory, PgOrderRepository, PgTicketTypeRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile_api=debug,turnstile_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let timeout = config.checkout.commit_timeout();
    tracing::info!("Starting Turnstile API on port {}", config.server.port);

    let state = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            AppState::in_memory(Arc::new(InMemoryStore::new()), timeout)
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database)
                .await
                .context("Failed to connect to Postgres")?;
            if config.database.run_migrations {
                db.migrate().await.context("Failed to run migrations")?;
            }
            let orders = Arc::new(PgOrderRepository::new(&db));
            AppState::new(
                Arc::new(PgEventDirectory::new(&db)),
                Arc::new(PgTicketTypeRepository::new(&db)),
                orders.clone(),
                orders,
                timeout,
            )
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app(state)).await.context("Server error")?;
    Ok(())
}
