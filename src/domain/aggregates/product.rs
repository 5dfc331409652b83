//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{non_negative_amount, slugify, CodeError, Sku};
use crate::CommerceError;

text_enum! {
    pub enum ProductStatus {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub tags: Vec<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub sku: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[validate(custom = "non_negative_amount")]
    pub price: Decimal,
    #[validate(custom = "non_negative_amount")]
    pub compare_at_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub sku: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[validate(custom = "non_negative_amount")]
    pub price: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub compare_at_price: Option<Decimal>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
}

impl Product {
    pub fn create(new: NewProduct) -> Result<Self, ProductError> {
        let sku = match new.sku {
            Some(sku) => Sku::new(sku)?,
            None => Sku::new(format!("SKU-{:08}", rand::random::<u32>() % 100_000_000))?,
        };
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            slug: slugify(&new.name),
            name: new.name,
            sku: sku.into_string(),
            description: new.description,
            price: new.price,
            compare_at_price: new.compare_at_price,
            stock: new.stock.unwrap_or(0),
            tags: new.tags.unwrap_or_default(),
            status: new.status.unwrap_or(ProductStatus::Active),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_patch(&mut self, patch: ProductPatch) -> Result<(), ProductError> {
        if let Some(sku) = patch.sku { self.sku = Sku::new(sku)?.into_string(); }
        if let Some(name) = patch.name {
            self.slug = slugify(&name);
            self.name = name;
        }
        if let Some(v) = patch.description { self.description = Some(v); }
        if let Some(v) = patch.price { self.price = v; }
        if let Some(v) = patch.compare_at_price { self.compare_at_price = Some(v); }
        if let Some(v) = patch.tags { self.tags = v; }
        if let Some(v) = patch.status { self.status = v; }
        self.touch();
        Ok(())
    }

    pub fn set_stock(&mut self, stock: i32) -> Result<(), ProductError> {
        if stock < 0 { return Err(ProductError::InvalidQuantity); }
        self.stock = stock;
        self.touch();
        Ok(())
    }

    pub fn remove_stock(&mut self, quantity: i32) -> Result<(), ProductError> {
        if quantity <= 0 { return Err(ProductError::InvalidQuantity); }
        if self.stock < quantity {
            return Err(ProductError::InsufficientStock { name: self.name.clone(), available: self.stock });
        }
        self.stock -= quantity;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Invalid SKU: {0}")]
    InvalidSku(#[from] CodeError),
    #[error("Insufficient stock for product {name} ({available} available)")]
    InsufficientStock { name: String, available: i32 },
    #[error("Invalid quantity")]
    InvalidQuantity,
}

impl From<ProductError> for CommerceError {
    fn from(e: ProductError) -> Self { CommerceError::BadRequest(e.to_string()) }
}
