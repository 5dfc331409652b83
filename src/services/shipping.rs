//! Shipping methods and checkout quotes.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::shipping::{NewShippingMethod, ShippingMethodPatch, DEFAULT_COUNTRY};
use crate::domain::aggregates::ShippingMethod;
use crate::domain::value_objects::non_negative_amount;
use crate::repository::ShippingRepository;
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteQuery {
    #[validate(custom = "non_negative_amount")]
    pub subtotal: Decimal,
    #[validate(length(min = 2, max = 2))]
    pub country: Option<String>,
}

fn not_found() -> CommerceError { CommerceError::NotFound("Shipping method not found".to_string()) }

#[derive(Clone)]
pub struct ShippingService {
    methods: Arc<dyn ShippingRepository>,
}

impl ShippingService {
    pub fn new(methods: Arc<dyn ShippingRepository>) -> Self { Self { methods } }

    pub async fn list_active(&self) -> Result<Vec<ShippingMethod>> { self.methods.list(false).await }

    pub async fn list_all(&self) -> Result<Vec<ShippingMethod>> { self.methods.list(true).await }

    pub async fn get(&self, id: Uuid) -> Result<ShippingMethod> {
        self.methods.find(id).await?.ok_or_else(not_found)
    }

    /// Active methods serving the country, each priced for `subtotal`.
    pub async fn calculate(&self, query: QuoteQuery) -> Result<Vec<ShippingMethod>> {
        query.validate()?;
        let country = query.country.as_deref().unwrap_or(DEFAULT_COUNTRY);
        let methods = self.methods.list(false).await?;
        Ok(methods
            .into_iter()
            .filter(|m| m.ships_to(country))
            .map(|mut m| {
                m.price = m.quote(query.subtotal);
                m
            })
            .collect())
    }

    pub async fn create(&self, input: NewShippingMethod) -> Result<ShippingMethod> {
        input.validate()?;
        let method = self.methods.insert(&ShippingMethod::create(input)?).await?;
        info!(method_id = %method.id, name = %method.name, "Shipping method created");
        Ok(method)
    }

    pub async fn update(&self, id: Uuid, patch: ShippingMethodPatch) -> Result<ShippingMethod> {
        patch.validate()?;
        let mut method = self.get(id).await?;
        method.apply_patch(patch)?;
        self.methods.update(&method).await?.ok_or_else(not_found)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.methods.delete(id).await? {
            return Err(not_found());
        }
        Ok(())
    }
}
