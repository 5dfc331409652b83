use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use super::extract::{AdminUser, AuthUser, Json, Path};
use super::AppState;
use crate::domain::aggregates::order::{NewOrder, OrderPatch};
use crate::domain::aggregates::Order;
use crate::services::orders::{PaymentStatusUpdate, StatusUpdate};
use crate::Result;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.services.orders.create(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.services.orders.list(&user.actor()).await?))
}

pub async fn get(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.get(&user.actor(), id).await?))
}

pub async fn by_number(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(number): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.get_by_number(&number).await?))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.update(id, patch).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.update_status(id, input).await?))
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(input): Json<PaymentStatusUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.update_payment_status(id, input).await?))
}

pub async fn validate_payment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    Ok(Json(state.services.orders.validate_cash_payment(id).await?))
}

pub async fn remove(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.services.orders.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
