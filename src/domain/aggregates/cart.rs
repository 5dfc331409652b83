//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::non_negative_amount;
use crate::CommerceError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(custom = "non_negative_amount")]
    pub price: Option<Decimal>,
}

impl CartItem {
    pub fn line_total(&self) -> Option<Decimal> { self.price.map(|p| p * Decimal::from(self.quantity)) }

    fn matches(&self, product_id: Uuid, variant_id: Option<Uuid>) -> bool {
        self.product_id == product_id && variant_id.map_or(true, |v| self.variant_id == Some(v))
    }
}

impl Cart {
    pub fn for_user(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, items: vec![], created_at: now, updated_at: now }
    }

    /// Units across all lines.
    pub fn item_count(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity)).sum() }

    /// Sum of the priced lines; lines without a price are skipped.
    pub fn subtotal(&self) -> Decimal { self.items.iter().filter_map(CartItem::line_total).sum() }

    /// A line for the same product and variant absorbs the added quantity.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.product_id == item.product_id && i.variant_id == item.variant_id)
        {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            if item.price.is_some() { existing.price = item.price; }
        } else {
            self.items.push(item);
        }
        self.touch();
        Ok(())
    }

    /// Zero or negative quantities remove the line; an unknown line is left alone.
    pub fn update_quantity(&mut self, product_id: Uuid, variant_id: Option<Uuid>, quantity: i64) {
        if let Some(index) = self.items.iter().position(|i| i.matches(product_id, variant_id)) {
            if quantity <= 0 {
                self.items.remove(index);
            } else if let Some(item) = self.items.get_mut(index) {
                item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            }
        }
        self.touch();
    }

    /// Without a variant, every line of the product goes.
    pub fn remove_item(&mut self, product_id: Uuid, variant_id: Option<Uuid>) {
        self.items.retain(|i| !i.matches(product_id, variant_id));
        self.touch();
    }

    pub fn replace_items(&mut self, items: Vec<CartItem>) -> Result<(), CartError> {
        if items.iter().any(|i| i.quantity == 0) { return Err(CartError::InvalidQuantity); }
        self.items = items;
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
}

impl From<CartError> for CommerceError {
    fn from(e: CartError) -> Self { CommerceError::BadRequest(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: Uuid, variant_id: Option<Uuid>, quantity: u32) -> CartItem {
        CartItem { product_id, variant_id, quantity, price: Some(Decimal::new(10, 0)) }
    }

    #[test]
    fn test_cart_operations() {
        let p1 = Uuid::now_v7();
        let mut cart = Cart::for_user(Uuid::now_v7());
        cart.add_item(item(p1, None, 2)).unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.subtotal(), Decimal::new(20, 0));
        cart.add_item(item(p1, None, 1)).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3); // Merged
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.add_item(item(p1, None, 0)), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let p1 = Uuid::now_v7();
        let (red, blue) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::for_user(Uuid::now_v7());
        cart.add_item(item(p1, Some(red), 1)).unwrap();
        cart.add_item(item(p1, Some(blue), 1)).unwrap();
        assert_eq!(cart.items.len(), 2);

        cart.remove_item(p1, Some(red));
        assert_eq!(cart.items, vec![item(p1, Some(blue), 1)]);

        cart.add_item(item(p1, Some(red), 1)).unwrap();
        cart.remove_item(p1, None);
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_update_quantity() {
        let (p1, p2) = (Uuid::now_v7(), Uuid::now_v7());
        let mut cart = Cart::for_user(Uuid::now_v7());
        cart.add_item(item(p1, None, 1)).unwrap();
        cart.update_quantity(p1, None, 4);
        assert_eq!(cart.items[0].quantity, 4);
        cart.update_quantity(p2, None, 4);
        assert_eq!(cart.items.len(), 1);
        cart.update_quantity(p1, None, 0);
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_unpriced_lines_do_not_count() {
        let mut cart = Cart::for_user(Uuid::now_v7());
        cart.add_item(CartItem { product_id: Uuid::now_v7(), variant_id: None, quantity: 3, price: None }).unwrap();
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }
}
