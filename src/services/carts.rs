//! Per-user shopping carts, created on first access.

use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartItem};
use crate::repository::CartRepository;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct ReplaceItems {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityUpdate {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ItemRef {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>) -> Self { Self { carts } }

    pub async fn get(&self, user_id: Uuid) -> Result<Cart> {
        match self.carts.find_by_user(user_id).await? {
            Some(cart) => Ok(cart),
            None => self.carts.save(&Cart::for_user(user_id)).await,
        }
    }

    pub async fn replace_items(&self, user_id: Uuid, input: ReplaceItems) -> Result<Cart> {
        for item in &input.items {
            item.validate()?;
        }
        let mut cart = self.get(user_id).await?;
        cart.replace_items(input.items)?;
        self.carts.save(&cart).await
    }

    pub async fn add_item(&self, user_id: Uuid, item: CartItem) -> Result<Cart> {
        item.validate()?;
        let mut cart = self.get(user_id).await?;
        cart.add_item(item)?;
        self.carts.save(&cart).await
    }

    pub async fn update_quantity(&self, user_id: Uuid, input: QuantityUpdate) -> Result<Cart> {
        let mut cart = self.get(user_id).await?;
        cart.update_quantity(input.product_id, input.variant_id, input.quantity);
        self.carts.save(&cart).await
    }

    pub async fn remove_item(&self, user_id: Uuid, item: ItemRef) -> Result<Cart> {
        let mut cart = self.get(user_id).await?;
        cart.remove_item(item.product_id, item.variant_id);
        self.carts.save(&cart).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<Cart> {
        let mut cart = self.get(user_id).await?;
        cart.clear();
        self.carts.save(&cart).await
    }
}
