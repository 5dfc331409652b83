use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;
use validator::Validate;

use super::extract::{AdminUser, AuthUser, Json, Path, Query};
use super::AppState;
use crate::domain::aggregates::coupon::{CouponPatch, NewCoupon};
use crate::domain::aggregates::Coupon;
use crate::services::coupons::{AmountQuery, AppliedCoupon, CouponValidation};
use crate::Result;

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let coupon = state.services.coupons.create(input).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(state.services.coupons.list().await?))
}

pub async fn get(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Coupon>> {
    Ok(Json(state.services.coupons.get(id).await?))
}

pub async fn by_code(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Coupon>> {
    Ok(Json(state.services.coupons.find_by_code(&code).await?))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<CouponPatch>,
) -> Result<Json<Coupon>> {
    Ok(Json(state.services.coupons.update(id, patch).await?))
}

pub async fn remove(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.services.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Read-only eligibility check; never consumes a use.
pub async fn validate(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(code): Path<String>,
    Query(query): Query<AmountQuery>,
) -> Result<Json<CouponValidation>> {
    query.validate()?;
    let coupon = state.services.coupons.validate(&code, query.amount).await?;
    Ok(Json(CouponValidation { valid: true, coupon }))
}

pub async fn apply(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(code): Path<String>,
    Json(body): Json<AmountQuery>,
) -> Result<Json<AppliedCoupon>> {
    body.validate()?;
    Ok(Json(state.services.coupons.apply(&code, body.amount).await?))
}
