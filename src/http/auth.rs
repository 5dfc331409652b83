use axum::extract::State;
use axum::http::StatusCode;

use super::extract::{AuthUser, Json};
use super::AppState;
use crate::domain::aggregates::User;
use crate::services::auth::{AuthResponse, LoginRequest, RegisterRequest};
use crate::Result;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.services.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<AuthResponse>> {
    Ok(Json(state.services.auth.login(req).await?))
}

pub async fn profile(State(state): State<AppState>, AuthUser(claims): AuthUser) -> Result<Json<User>> {
    Ok(Json(state.services.auth.profile(claims.sub).await?))
}
