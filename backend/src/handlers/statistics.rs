//! HTTP handlers for dashboard statistics

use axum::{extract::State, Json};
use shared::{ApiResponse, Statistics};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::AppState;

/// Current counters, as stored
pub async fn dashboard_stats(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Statistics>>> {
    let stats = state.statistics.snapshot().await?;
    Ok(Json(ApiResponse::ok("Statistics retrieved", stats)))
}

/// Repair drift by recomputing from products and sales
pub async fn recompute_stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Statistics>>> {
    let stats = state.statistics.recompute().await?;
    tracing::info!(actor_id = %current_user.0.id, "Statistics recomputed on demand");
    Ok(Json(ApiResponse::ok("Statistics recomputed", stats)))
}
