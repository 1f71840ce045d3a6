//! Route definitions for the Shopfloor backend

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Protected routes - inventory
        .nest("/inventory", inventory_routes())
        // Protected routes - sales ledger
        .nest("/sales", sales_routes())
        // Protected routes - dashboard statistics
        .nest("/statistics", statistics_routes())
        // Protected routes - notifications
        .nest("/notifications", notification_routes())
        // Protected routes - audit log
        .nest("/audit", audit_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
        // Health check (public)
        .route("/health", get(handlers::health_check))
}

/// Inventory routes
fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/stock-in", post(handlers::stock_in))
        .route("/purchase", post(handlers::purchase))
        .route("/products", get(handlers::list_products))
        .route("/search", get(handlers::search_products))
        .route(
            "/products/:name",
            put(handlers::edit_product).delete(handlers::delete_product),
        )
}

/// Sales routes
fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales))
        .route("/:sale_id/status", put(handlers::update_sale_status))
}

/// Statistics routes
fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::dashboard_stats))
        .route("/recompute", post(handlers::recompute_stats))
}

/// Notification routes
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_notifications))
        .route("/:notification_id/read", put(handlers::mark_as_read))
}

/// Audit log routes
fn audit_routes() -> Router<AppState> {
    Router::new().route("/logs", get(handlers::view_logs).delete(handlers::clear_logs))
}
