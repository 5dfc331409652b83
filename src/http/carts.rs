//! The signed-in user's cart. Lines are addressed by product, narrowed by `?variant_id=`.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extract::{AuthUser, Json, Path, Query};
use super::AppState;
use crate::domain::aggregates::{Cart, CartItem};
use crate::services::carts::{ItemRef, QuantityUpdate, ReplaceItems};
use crate::Result;

/// The cart plus its running totals.
#[derive(Debug, Serialize)]
pub struct CartBody {
    #[serde(flatten)]
    pub cart: Cart,
    pub item_count: u64,
    pub subtotal: Decimal,
}

impl From<Cart> for CartBody {
    fn from(cart: Cart) -> Self {
        Self { item_count: cart.item_count(), subtotal: cart.subtotal(), cart }
    }
}

#[derive(Debug, Deserialize)]
pub struct VariantQuery {
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityBody {
    pub quantity: i64,
    pub variant_id: Option<Uuid>,
}

pub async fn get(State(state): State<AppState>, AuthUser(claims): AuthUser) -> Result<Json<CartBody>> {
    Ok(Json(state.services.carts.get(claims.sub).await?.into()))
}

pub async fn replace_items(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(input): Json<ReplaceItems>,
) -> Result<Json<CartBody>> {
    Ok(Json(state.services.carts.replace_items(claims.sub, input).await?.into()))
}

pub async fn add_item(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(item): Json<CartItem>,
) -> Result<Json<CartBody>> {
    Ok(Json(state.services.carts.add_item(claims.sub, item).await?.into()))
}

pub async fn update_quantity(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(product_id): Path<Uuid>,
    Json(body): Json<QuantityBody>,
) -> Result<Json<CartBody>> {
    let input = QuantityUpdate { product_id, variant_id: body.variant_id, quantity: body.quantity };
    Ok(Json(state.services.carts.update_quantity(claims.sub, input).await?.into()))
}

pub async fn remove_item(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<VariantQuery>,
) -> Result<Json<CartBody>> {
    let item = ItemRef { product_id, variant_id: query.variant_id };
    Ok(Json(state.services.carts.remove_item(claims.sub, item).await?.into()))
}

pub async fn clear(State(state): State<AppState>, AuthUser(claims): AuthUser) -> Result<Json<CartBody>> {
    Ok(Json(state.services.carts.clear(claims.sub).await?.into()))
}
