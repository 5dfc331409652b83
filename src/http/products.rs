use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use super::extract::{AdminUser, Json, Path, Query};
use super::AppState;
use crate::domain::aggregates::product::{NewProduct, ProductPatch};
use crate::domain::aggregates::Product;
use crate::services::catalog::{ListParams, PaginatedResponse, StockDecrement, StockUpdate};
use crate::Result;

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    Ok(Json(state.services.catalog.list(params, false).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.get(id).await?))
}

pub async fn by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.get_by_slug(&slug).await?))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.services.catalog.create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.update(id, patch).await?))
}

pub async fn remove(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.services.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_stock(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<StockUpdate>,
) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.set_stock(id, input).await?))
}

pub async fn decrement_stock(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<StockDecrement>,
) -> Result<Json<Product>> {
    Ok(Json(state.services.catalog.decrement_stock(id, input).await?))
}
