use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use super::extract::{AdminUser, Json, Path, Query};
use super::AppState;
use crate::domain::aggregates::shipping::{NewShippingMethod, ShippingMethodPatch};
use crate::domain::aggregates::ShippingMethod;
use crate::services::shipping::QuoteQuery;
use crate::Result;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ShippingMethod>>> {
    Ok(Json(state.services.shipping.list_active().await?))
}

/// Includes inactive methods.
pub async fn list_all(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<ShippingMethod>>> {
    Ok(Json(state.services.shipping.list_all().await?))
}

pub async fn calculate(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Vec<ShippingMethod>>> {
    Ok(Json(state.services.shipping.calculate(query).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ShippingMethod>> {
    Ok(Json(state.services.shipping.get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<NewShippingMethod>,
) -> Result<(StatusCode, Json<ShippingMethod>)> {
    let method = state.services.shipping.create(input).await?;
    Ok((StatusCode::CREATED, Json(method)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ShippingMethodPatch>,
) -> Result<Json<ShippingMethod>> {
    Ok(Json(state.services.shipping.update(id, patch).await?))
}

pub async fn remove(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.services.shipping.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
