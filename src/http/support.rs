use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use super::extract::{AdminUser, AuthUser, Json, Path};
use super::AppState;
use crate::domain::aggregates::support::{NewMessage, NewTicket, TicketPatch};
use crate::domain::aggregates::{SupportTicket, TicketMessage};
use crate::Result;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NewTicket>,
) -> Result<(StatusCode, Json<SupportTicket>)> {
    let ticket = state.services.support.create(&user.actor(), input).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<SupportTicket>>> {
    Ok(Json(state.services.support.list(&user.actor()).await?))
}

pub async fn get(State(state): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<SupportTicket>> {
    Ok(Json(state.services.support.get(&user.actor(), id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<TicketPatch>,
) -> Result<Json<SupportTicket>> {
    Ok(Json(state.services.support.update(id, patch).await?))
}

pub async fn add_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<NewMessage>,
) -> Result<(StatusCode, Json<TicketMessage>)> {
    let message = state.services.support.add_message(&user.actor(), id, input).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn remove(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.services.support.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
