//! Value Objects for the storefront

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use validator::ValidationError;

const MAX_CODE_LEN: usize = 50;

fn normalize_code(value: impl Into<String>) -> Result<String, CodeError> {
    let value = value.into().trim().to_uppercase();
    if value.is_empty() { return Err(CodeError::Empty); }
    if value.chars().count() > MAX_CODE_LEN { return Err(CodeError::TooLong(MAX_CODE_LEN)); }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("code must not be empty")]
    Empty,
    #[error("code must be at most {0} characters")]
    TooLong(usize),
}

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> { normalize_code(value).map(Self) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Coupon code. Codes are case-insensitive, so they are kept upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> { normalize_code(value).map(Self) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

const ORDER_SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ORDER_SUFFIX_LEN: usize = 9;

/// Human-facing order reference: `ORD-<unix millis>-<9 uppercase alphanumerics>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(at: DateTime<Utc>) -> Self { Self::generate_with(at, &mut rand::thread_rng()) }

    pub fn generate_with<R: Rng + ?Sized>(at: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: String = (0..ORDER_SUFFIX_LEN)
            .map(|_| char::from(ORDER_SUFFIX_ALPHABET[rng.gen_range(0..ORDER_SUFFIX_ALPHABET.len())]))
            .collect();
        Self(format!("ORD-{}-{}", at.timestamp_millis(), suffix))
    }

    pub fn is_well_formed(value: &str) -> bool {
        let mut parts = value.splitn(3, '-');
        let (Some(prefix), Some(millis), Some(suffix)) = (parts.next(), parts.next(), parts.next()) else {
            return false;
        };
        prefix == "ORD"
            && !millis.is_empty()
            && millis.bytes().all(|b| b.is_ascii_digit())
            && suffix.len() == ORDER_SUFFIX_LEN
            && suffix.bytes().all(|b| ORDER_SUFFIX_ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// URL slug derived from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') { slug.pop(); }
    slug
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

// Field validators shared by request payloads.

pub fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO { return Err(ValidationError::new("negative_amount")); }
    Ok(())
}

pub fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO { return Err(ValidationError::new("non_positive_amount")); }
    Ok(())
}

/// Patch fields that can be cleared: absent stays `None`, `null` becomes `Some(None)`.
/// Pair with `#[serde(default)]`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn non_empty_list(value: &serde_json::Value) -> Result<(), ValidationError> {
    match value.as_array() {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(ValidationError::new("empty_list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }

    #[test]
    fn test_coupon_code_is_upper_cased() {
        assert_eq!(CouponCode::new("  summer10 ").unwrap().as_str(), "SUMMER10");
        assert_eq!(CouponCode::new("   "), Err(CodeError::Empty));
        assert_eq!(CouponCode::new("x".repeat(51)), Err(CodeError::TooLong(50)));
    }

    #[test]
    fn test_order_number_format() {
        let at = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let number = OrderNumber::generate_with(at, &mut rng);
            assert!(OrderNumber::is_well_formed(number.as_str()), "{number}");
            assert!(number.as_str().starts_with(&format!("ORD-{}-", at.timestamp_millis())));
        }
        assert!(!OrderNumber::is_well_formed("ORD-123-abcdefghi"));
        assert!(!OrderNumber::is_well_formed("ORD-12a-ABCDEFGHI"));
        assert!(!OrderNumber::is_well_formed("ORD-123-ABCDEFGH"));
    }

    #[test]
    fn test_generated_order_numbers_differ() {
        let at = Utc::now();
        let a = OrderNumber::generate(at);
        let b = OrderNumber::generate(at);
        assert_ne!(a, b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Blue Cotton T-Shirt"), "blue-cotton-t-shirt");
        assert_eq!(slugify("  Mug  (XL)!! "), "mug-xl");
    }

    #[test]
    fn test_amount_validators() {
        assert!(non_negative_amount(&Decimal::ZERO).is_ok());
        assert!(non_negative_amount(&Decimal::new(-1, 2)).is_err());
        assert!(positive_amount(&Decimal::ZERO).is_err());
        assert!(positive_amount(&Decimal::new(1, 2)).is_ok());
        assert!(non_empty_list(&serde_json::json!([{"name": "Mug"}])).is_ok());
        assert!(non_empty_list(&serde_json::json!([])).is_err());
        assert!(non_empty_list(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_normalize_email() { assert_eq!(normalize_email(" Jane@Example.COM "), "jane@example.com"); }
}
