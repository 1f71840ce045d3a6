//! HTTP handlers for the caller's notifications

use axum::{extract::State, Json};
use shared::{ApiResponse, Notification};
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::AppPath;
use crate::middleware::CurrentUser;
use crate::AppState;

/// The caller's notifications, newest first
pub async fn get_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let notifications = state.notifications.list_for_user(current_user.0.id).await?;
    Ok(Json(ApiResponse::ok("Notifications retrieved", notifications)))
}

/// Mark one of the caller's notifications as read
pub async fn mark_as_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    AppPath(notification_id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = state.notifications.mark_read(current_user.0.id, notification_id).await?;
    Ok(Json(ApiResponse::ok("Notification marked as read", notification)))
}
