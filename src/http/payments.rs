use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use super::extract::{AdminUser, AuthUser, Json, Path};
use super::AppState;
use crate::domain::aggregates::{PaymentTransaction, Refund};
use crate::services::payments::{NewTransaction, RefundDecision, RefundRequest, TransactionStatusUpdate};
use crate::Result;

pub async fn create_transaction(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(input): Json<NewTransaction>,
) -> Result<(StatusCode, Json<PaymentTransaction>)> {
    let transaction = state.services.payments.create_transaction(input).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn transactions_for_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentTransaction>>> {
    Ok(Json(state.services.payments.transactions_for_order(order_id).await?))
}

/// `transaction_id` is the payment provider's id, not ours.
pub async fn update_transaction_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(transaction_id): Path<String>,
    Json(input): Json<TransactionStatusUpdate>,
) -> Result<Json<PaymentTransaction>> {
    Ok(Json(state.services.payments.update_transaction_status(&transaction_id, input).await?))
}

pub async fn request_refund(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(input): Json<RefundRequest>,
) -> Result<(StatusCode, Json<Refund>)> {
    let refund = state.services.payments.request_refund(input).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn list_refunds(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Refund>>> {
    Ok(Json(state.services.payments.list_refunds().await?))
}

pub async fn process_refund(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(decision): Json<RefundDecision>,
) -> Result<Json<Refund>> {
    Ok(Json(state.services.payments.process_refund(id, decision, admin.sub).await?))
}
