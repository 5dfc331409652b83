//! Shipping methods offered at checkout

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{non_negative_amount, nullable};
use crate::CommerceError;

pub const DEFAULT_COUNTRY: &str = "FR";
pub const DEFAULT_COUNTRIES: [&str; 4] = ["FR", "BE", "CH", "LU"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub estimated_days_min: Option<i32>,
    pub estimated_days_max: Option<i32>,
    /// Orders at or above this subtotal ship for free.
    pub free_shipping_threshold: Option<Decimal>,
    pub is_active: bool,
    /// Upper-case ISO country codes.
    pub countries: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewShippingMethod {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "non_negative_amount")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub estimated_days_min: Option<i32>,
    #[validate(range(min = 0))]
    pub estimated_days_max: Option<i32>,
    #[validate(custom = "non_negative_amount")]
    pub free_shipping_threshold: Option<Decimal>,
    pub is_active: Option<bool>,
    pub countries: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ShippingMethodPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[validate(custom = "non_negative_amount")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(range(min = 0))]
    pub estimated_days_min: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(range(min = 0))]
    pub estimated_days_max: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(custom = "non_negative_amount")]
    pub free_shipping_threshold: Option<Option<Decimal>>,
    pub is_active: Option<bool>,
    pub countries: Option<Vec<String>>,
}

fn normalize_countries(countries: Vec<String>) -> Vec<String> {
    let mut codes: Vec<String> = Vec::with_capacity(countries.len());
    for code in countries.into_iter().map(|c| c.trim().to_uppercase()) {
        if !code.is_empty() && !codes.contains(&code) { codes.push(code); }
    }
    codes
}

impl ShippingMethod {
    pub fn create(new: NewShippingMethod) -> Result<Self, ShippingError> {
        let method = Self {
            id: Uuid::now_v7(),
            name: new.name,
            description: new.description,
            price: new.price,
            estimated_days_min: new.estimated_days_min,
            estimated_days_max: new.estimated_days_max,
            free_shipping_threshold: new.free_shipping_threshold,
            is_active: new.is_active.unwrap_or(true),
            countries: match new.countries {
                Some(countries) => normalize_countries(countries),
                None => DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            },
            created_at: Utc::now(),
        };
        method.check_delivery_window()?;
        Ok(method)
    }

    pub fn apply_patch(&mut self, patch: ShippingMethodPatch) -> Result<(), ShippingError> {
        let mut next = self.clone();
        if let Some(v) = patch.name { next.name = v; }
        if let Some(v) = patch.description { next.description = v; }
        if let Some(v) = patch.price { next.price = v; }
        if let Some(v) = patch.estimated_days_min { next.estimated_days_min = v; }
        if let Some(v) = patch.estimated_days_max { next.estimated_days_max = v; }
        if let Some(v) = patch.free_shipping_threshold { next.free_shipping_threshold = v; }
        if let Some(v) = patch.is_active { next.is_active = v; }
        if let Some(v) = patch.countries { next.countries = normalize_countries(v); }
        next.check_delivery_window()?;
        *self = next;
        Ok(())
    }

    fn check_delivery_window(&self) -> Result<(), ShippingError> {
        match (self.estimated_days_min, self.estimated_days_max) {
            (Some(min), Some(max)) if min > max => Err(ShippingError::DeliveryWindow { min, max }),
            _ => Ok(()),
        }
    }

    pub fn ships_to(&self, country: &str) -> bool {
        self.countries.iter().any(|c| c.eq_ignore_ascii_case(country.trim()))
    }

    /// The price for an order of `subtotal`, free once the threshold is reached.
    pub fn quote(&self, subtotal: Decimal) -> Decimal {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    #[error("Delivery estimate is inverted ({min} > {max} days)")]
    DeliveryWindow { min: i32, max: i32 },
}

impl From<ShippingError> for CommerceError {
    fn from(e: ShippingError) -> Self { CommerceError::BadRequest(e.to_string()) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_method(name: &str, price: i64) -> NewShippingMethod {
        NewShippingMethod {
            name: name.into(), description: None, price: Decimal::new(price, 0),
            estimated_days_min: Some(2), estimated_days_max: Some(4),
            free_shipping_threshold: None, is_active: None, countries: None,
        }
    }

    #[test]
    fn test_defaults() {
        let method = ShippingMethod::create(new_method("Colissimo", 5)).unwrap();
        assert!(method.is_active);
        assert_eq!(method.countries, ["FR", "BE", "CH", "LU"]);
        assert!(method.ships_to("be"));
        assert!(!method.ships_to("DE"));
    }

    #[test]
    fn test_free_above_threshold() {
        let mut input = new_method("Express", 9);
        input.free_shipping_threshold = Some(Decimal::new(60, 0));
        let method = ShippingMethod::create(input).unwrap();
        assert_eq!(method.quote(Decimal::new(5999, 2)), Decimal::new(9, 0));
        assert_eq!(method.quote(Decimal::new(60, 0)), Decimal::ZERO);
    }

    #[test]
    fn test_inverted_window_is_refused() {
        let mut input = new_method("Slow", 1);
        input.estimated_days_min = Some(10);
        assert_eq!(ShippingMethod::create(input), Err(ShippingError::DeliveryWindow { min: 10, max: 4 }));

        let mut method = ShippingMethod::create(new_method("Slow", 1)).unwrap();
        let patch = ShippingMethodPatch { estimated_days_max: Some(Some(1)), ..ShippingMethodPatch::default() };
        assert!(method.apply_patch(patch).is_err());
        assert_eq!(method.estimated_days_max, Some(4));
    }

    #[test]
    fn test_patch_normalizes_countries_and_clears_threshold() {
        let mut input = new_method("Relay", 4);
        input.free_shipping_threshold = Some(Decimal::new(50, 0));
        let mut method = ShippingMethod::create(input).unwrap();
        let patch: ShippingMethodPatch =
            serde_json::from_value(serde_json::json!({"countries": [" de", "at "], "free_shipping_threshold": null}))
                .unwrap();
        method.apply_patch(patch).unwrap();
        assert_eq!(method.countries, ["DE", "AT"]);
        assert_eq!(method.free_shipping_threshold, None);
    }
}
