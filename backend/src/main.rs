//! Shopfloor operations backend - server binary

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use shopfloor_backend::{
    config::StoreBackend,
    create_app,
    services::{sales::spawn_key_purger, statistics::spawn_reconciler},
    store::Stores,
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;
    config.validate()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "shopfloor_server=debug,shopfloor_backend=debug,tower_http=debug,sqlx=warn".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Shopfloor Server");
    tracing::info!("Environment: {}", config.environment);

    let stores = match config.store.backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&config.database.url)
                .await
                .context("failed to connect to the database")?;
            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            Stores::postgres(db_pool)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on restart");
            Stores::memory()
        }
    };

    let reconcile_every = config.statistics.reconcile_interval_secs;
    let purge_every = config.idempotency.purge_interval_secs;
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    // Create application state
    let state = AppState::new(config, stores);

    let reconciler = (reconcile_every > 0).then(|| {
        tracing::info!("Reconciling statistics every {}s", reconcile_every);
        spawn_reconciler(state.statistics.clone(), Duration::from_secs(reconcile_every))
    });
    let key_purger = (purge_every > 0).then(|| {
        tracing::info!("Purging expired purchase keys every {}s", purge_every);
        spawn_key_purger(state.ledger.clone(), Duration::from_secs(purge_every))
    });

    // Build application
    let app = create_app(state.clone());

    // Start server
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in [reconciler, key_purger].into_iter().flatten() {
        task.abort();
    }
    // Let queued statistics and notifications land before exiting
    state.coordinator.effects().flush().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
