//! HTTP handlers for the audit log

use axum::{extract::State, Json};
use serde::Serialize;
use shared::{ApiResponse, Notification};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::AppState;

/// Every actor's log entries, newest first
pub async fn view_logs(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let logs = state.notifications.list_all().await?;
    Ok(Json(ApiResponse::ok("Logs retrieved", logs)))
}

#[derive(Debug, Serialize)]
pub struct ClearLogsResponse {
    pub cleared: u64,
}

pub async fn clear_logs(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<ClearLogsResponse>>> {
    let cleared = state.notifications.clear_all().await?;
    tracing::info!(actor_id = %current_user.0.id, cleared, "Logs cleared");
    Ok(Json(ApiResponse::ok(
        "Logs cleared successfully",
        ClearLogsResponse { cleared },
    )))
}
