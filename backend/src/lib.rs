//! Shopfloor operations backend
//!
//! Inventory, point-of-sale and dashboard statistics for small businesses,
//! served over a REST API.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use crate::config::Config;

use services::{
    InventoryCoordinator, NotificationSink, ProductCatalog, SalesLedger, SideEffectDispatcher,
    StatisticsService,
};
use store::Stores;

/// Application state shared across handlers. Services are built once here;
/// writes go through the coordinator, reads through the services directly.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: InventoryCoordinator,
    pub catalog: ProductCatalog,
    pub ledger: SalesLedger,
    pub statistics: StatisticsService,
    pub notifications: NotificationSink,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the services over `stores` and start the side-effect worker.
    /// Must be called inside a tokio runtime.
    pub fn new(config: Config, stores: Stores) -> Self {
        let catalog = ProductCatalog::new(stores.catalog);
        let ledger =
            SalesLedger::new(stores.sales).with_key_policy(config.idempotency.key_policy());
        let statistics = StatisticsService::new(stores.statistics);
        let notifications = NotificationSink::new(stores.notifications);

        let effects = SideEffectDispatcher::spawn(
            statistics.clone(),
            notifications.clone(),
            config.side_effects.queue_capacity,
        );
        let coordinator = InventoryCoordinator::new(catalog.clone(), ledger.clone(), effects);

        Self {
            coordinator,
            catalog,
            ledger,
            statistics,
            notifications,
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Shopfloor Operations API v1.0"
}
