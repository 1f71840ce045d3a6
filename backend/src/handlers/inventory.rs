//! HTTP handlers for inventory endpoints

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use shared::{
    ApiResponse, EditProductInput, Product, PurchaseInput, PurchaseReceipt, SearchQuery,
    StockInInput,
};

use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::CurrentUser;
use crate::AppState;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Add stock, creating the product when the name is new
pub async fn stock_in(
    State(state): State<AppState>,
    current_user: CurrentUser,
    AppJson(input): AppJson<StockInInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let (product, created) = state.coordinator.stock_in(input, &current_user.0).await?;

    Ok(if created {
        (
            StatusCode::CREATED,
            Json(ApiResponse::ok("Product created successfully", product)),
        )
    } else {
        (
            StatusCode::OK,
            Json(ApiResponse::ok("Stock updated successfully", product)),
        )
    })
}

/// Overwrite a product
pub async fn edit_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    AppPath(name): AppPath<String>,
    AppJson(input): AppJson<EditProductInput>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = state
        .coordinator
        .edit_product(&name, input, &current_user.0)
        .await?;
    Ok(Json(ApiResponse::ok("Product updated successfully", product)))
}

/// Delete a product
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    AppPath(name): AppPath<String>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let deleted = state
        .coordinator
        .delete_product(&name, &current_user.0)
        .await?;
    Ok(Json(ApiResponse::ok("Product deleted successfully", deleted)))
}

/// List all products
pub async fn list_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let products = state.catalog.list_all().await?;
    Ok(Json(ApiResponse::ok("Products retrieved successfully", products)))
}

/// Search products by name or category
pub async fn search_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let products = state.catalog.search(&query.query).await?;
    Ok(Json(ApiResponse::ok("Products retrieved successfully", products)))
}

/// Buy a product. An `Idempotency-Key` header takes precedence over the
/// body field.
pub async fn purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    headers: HeaderMap,
    AppJson(mut input): AppJson<PurchaseInput>,
) -> AppResult<Json<ApiResponse<PurchaseReceipt>>> {
    if let Some(key) = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        input.idempotency_key = Some(key.to_string());
    }

    let receipt = state.coordinator.purchase(input, &current_user.0).await?;
    Ok(Json(ApiResponse::ok("Purchase successful", receipt)))
}
