//! HTTP handlers for the sales ledger

use axum::{extract::State, Json};
use shared::{ApiResponse, Sale, UpdateSaleStatusInput};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::CurrentUser;
use crate::AppState;

/// All sales, newest first
pub async fn list_sales(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Vec<Sale>>>> {
    let sales = state.ledger.list_all(true).await?;
    if sales.is_empty() {
        return Err(AppError::NotFound("Sales".to_string()));
    }
    Ok(Json(ApiResponse::ok("Sales retrieved successfully", sales)))
}

/// Change a sale's status
pub async fn update_sale_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    AppPath(sale_id): AppPath<Uuid>,
    AppJson(input): AppJson<UpdateSaleStatusInput>,
) -> AppResult<Json<ApiResponse<Sale>>> {
    let sale = state
        .coordinator
        .update_sale_status(sale_id, input.status, &current_user.0)
        .await?;
    Ok(Json(ApiResponse::ok("Sale status updated", sale)))
}
