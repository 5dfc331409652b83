//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{non_negative_amount, nullable, positive_amount, CodeError, CouponCode};
use crate::CommerceError;

text_enum! {
    /// How a coupon's `value` is read: a percentage of the amount or a flat amount.
    pub enum CouponType {
        Percentage => "percentage",
        Fixed => "fixed",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCoupon {
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    #[validate(custom = "positive_amount")]
    pub value: Decimal,
    #[validate(custom = "non_negative_amount")]
    pub min_purchase: Option<Decimal>,
    #[validate(custom = "positive_amount")]
    pub max_discount: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}

/// Partial update. The optional limits take `null` to remove them.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct CouponPatch {
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub coupon_type: Option<CouponType>,
    #[validate(custom = "positive_amount")]
    pub value: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(custom = "non_negative_amount")]
    pub min_purchase: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(custom = "positive_amount")]
    pub max_discount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(range(min = 1))]
    pub usage_limit: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

impl Coupon {
    pub fn create(new: NewCoupon) -> Result<Self, CouponError> {
        let now = Utc::now();
        let coupon = Self {
            id: Uuid::now_v7(),
            code: CouponCode::new(new.code)?.into_string(),
            coupon_type: new.coupon_type,
            value: new.value,
            min_purchase: new.min_purchase,
            max_discount: new.max_discount,
            expires_at: new.expires_at,
            usage_limit: new.usage_limit,
            usage_count: 0,
            is_active: new.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        coupon.check_value()?;
        Ok(coupon)
    }

    /// `usage_count` is not patchable; it only moves through redemption.
    pub fn apply_patch(&mut self, patch: CouponPatch) -> Result<(), CouponError> {
        let mut next = self.clone();
        if let Some(code) = patch.code { next.code = CouponCode::new(code)?.into_string(); }
        if let Some(v) = patch.coupon_type { next.coupon_type = v; }
        if let Some(v) = patch.value { next.value = v; }
        if let Some(v) = patch.min_purchase { next.min_purchase = v; }
        if let Some(v) = patch.max_discount { next.max_discount = v; }
        if let Some(v) = patch.expires_at { next.expires_at = v; }
        if let Some(v) = patch.usage_limit { next.usage_limit = v; }
        if let Some(v) = patch.is_active { next.is_active = v; }
        next.check_value()?;
        if next.usage_limit.is_some_and(|limit| limit < next.usage_count) {
            return Err(CouponError::LimitBelowUsage(next.usage_count));
        }
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    fn check_value(&self) -> Result<(), CouponError> {
        if self.coupon_type == CouponType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(CouponError::PercentageTooHigh);
        }
        Ok(())
    }

    /// Checks, in order: active flag, expiry, usage limit, minimum purchase.
    pub fn check_eligibility(&self, amount: Decimal, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_active { return Err(CouponError::Inactive); }
        if self.expires_at.is_some_and(|at| at < now) { return Err(CouponError::Expired); }
        if self.is_exhausted() { return Err(CouponError::UsageLimitReached); }
        if let Some(min) = self.min_purchase {
            if amount < min { return Err(CouponError::MinimumPurchase(min)); }
        }
        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.usage_count >= limit)
    }

    /// Percentage coupons are capped by `max_discount`; fixed coupons always yield `value`,
    /// even when it exceeds the amount.
    pub fn discount_for(&self, amount: Decimal) -> Decimal {
        match self.coupon_type {
            CouponType::Percentage => {
                let discount = amount * self.value / Decimal::ONE_HUNDRED;
                match self.max_discount {
                    Some(cap) if discount > cap => cap,
                    _ => discount,
                }
            }
            CouponType::Fixed => self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum purchase of {0} required")]
    MinimumPurchase(Decimal),
    #[error("Invalid coupon code: {0}")]
    InvalidCode(#[from] CodeError),
    #[error("Percentage coupons cannot exceed 100")]
    PercentageTooHigh,
    #[error("Usage limit cannot be below current usage ({0})")]
    LimitBelowUsage(i32),
}

impl From<CouponError> for CommerceError {
    fn from(e: CouponError) -> Self { CommerceError::BadRequest(e.to_string()) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn coupon(coupon_type: CouponType, value: Decimal) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::now_v7(), code: "SAVE".into(), coupon_type, value,
            min_purchase: None, max_discount: None, expires_at: None,
            usage_limit: None, usage_count: 0, is_active: true, created_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let c = coupon(CouponType::Percentage, Decimal::new(10, 0));
        assert_eq!(c.discount_for(Decimal::new(250, 0)), Decimal::new(25, 0));
    }

    #[test]
    fn test_percentage_discount_is_capped() {
        let mut c = coupon(CouponType::Percentage, Decimal::new(50, 0));
        c.max_discount = Some(Decimal::new(30, 0));
        assert_eq!(c.discount_for(Decimal::new(200, 0)), Decimal::new(30, 0));
        assert_eq!(c.discount_for(Decimal::new(40, 0)), Decimal::new(20, 0));
    }

    #[test]
    fn test_fixed_discount_ignores_amount() {
        let mut c = coupon(CouponType::Fixed, Decimal::new(15, 0));
        c.max_discount = Some(Decimal::new(5, 0));
        assert_eq!(c.discount_for(Decimal::new(10, 0)), Decimal::new(15, 0));
        assert_eq!(c.discount_for(Decimal::new(1000, 0)), Decimal::new(15, 0));
    }

    #[test]
    fn test_eligibility_checks_in_order() {
        let now = Utc::now();
        let mut c = coupon(CouponType::Fixed, Decimal::new(5, 0));
        c.is_active = false;
        c.expires_at = Some(now - Duration::days(1));
        assert_eq!(c.check_eligibility(Decimal::ZERO, now), Err(CouponError::Inactive));

        c.is_active = true;
        assert_eq!(c.check_eligibility(Decimal::ZERO, now), Err(CouponError::Expired));

        c.expires_at = Some(now + Duration::days(1));
        c.usage_limit = Some(2);
        c.usage_count = 2;
        c.min_purchase = Some(Decimal::new(50, 0));
        assert_eq!(c.check_eligibility(Decimal::ZERO, now), Err(CouponError::UsageLimitReached));

        c.usage_count = 1;
        assert_eq!(
            c.check_eligibility(Decimal::new(49, 0), now),
            Err(CouponError::MinimumPurchase(Decimal::new(50, 0)))
        );
        assert_eq!(c.check_eligibility(Decimal::new(50, 0), now), Ok(()));
    }

    fn new_coupon(coupon_type: CouponType, value: i64) -> NewCoupon {
        NewCoupon {
            code: " summer10 ".into(), coupon_type, value: Decimal::new(value, 0),
            min_purchase: None, max_discount: None, expires_at: None, usage_limit: None, is_active: None,
        }
    }

    #[test]
    fn test_create_normalizes_code() {
        let c = Coupon::create(new_coupon(CouponType::Percentage, 10)).unwrap();
        assert_eq!(c.code, "SUMMER10");
        assert!(c.is_active);
        assert_eq!(c.usage_count, 0);
    }

    #[test]
    fn test_percentage_over_hundred_is_refused() {
        assert_eq!(Coupon::create(new_coupon(CouponType::Percentage, 150)), Err(CouponError::PercentageTooHigh));
        let mut c = Coupon::create(new_coupon(CouponType::Fixed, 150)).unwrap();
        let patch = CouponPatch { coupon_type: Some(CouponType::Percentage), ..CouponPatch::default() };
        assert_eq!(c.apply_patch(patch), Err(CouponError::PercentageTooHigh));
        assert_eq!(c.coupon_type, CouponType::Fixed);
    }

    #[test]
    fn test_usage_limit_cannot_drop_below_usage() {
        let mut c = coupon(CouponType::Fixed, Decimal::new(5, 0));
        c.usage_limit = Some(5);
        c.usage_count = 3;
        let patch = CouponPatch { usage_limit: Some(Some(1)), ..CouponPatch::default() };
        assert_eq!(c.apply_patch(patch), Err(CouponError::LimitBelowUsage(3)));
        assert_eq!(c.usage_limit, Some(5));

        let patch = CouponPatch { usage_limit: Some(Some(3)), ..CouponPatch::default() };
        assert_eq!(c.apply_patch(patch), Ok(()));
        assert!(c.is_exhausted());
    }

    #[test]
    fn test_patch_null_clears_limits() {
        let mut c = coupon(CouponType::Percentage, Decimal::new(10, 0));
        c.min_purchase = Some(Decimal::new(50, 0));
        c.max_discount = Some(Decimal::new(20, 0));
        c.usage_limit = Some(10);
        c.expires_at = Some(Utc::now());

        let patch: CouponPatch = serde_json::from_value(serde_json::json!({
            "min_purchase": null,
            "usage_limit": null,
            "expires_at": null,
        }))
        .unwrap();
        assert_eq!(patch.max_discount, None);
        c.apply_patch(patch).unwrap();

        assert_eq!(c.min_purchase, None);
        assert_eq!(c.usage_limit, None);
        assert_eq!(c.expires_at, None);
        assert_eq!(c.max_discount, Some(Decimal::new(20, 0)));
    }

    #[test]
    fn test_patch_limits_are_validated_when_set() {
        let patch: CouponPatch = serde_json::from_value(serde_json::json!({"usage_limit": 0})).unwrap();
        assert!(patch.validate().is_err());
        let patch: CouponPatch = serde_json::from_value(serde_json::json!({"usage_limit": null})).unwrap();
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_zero_usage_limit_fails_validation() {
        let mut input = new_coupon(CouponType::Fixed, 5);
        input.usage_limit = Some(0);
        assert!(input.validate().is_err());
        input.usage_limit = Some(1);
        input.max_discount = Some(Decimal::ZERO);
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_coupon_type_labels() {
        assert_eq!("percentage".parse::<CouponType>().unwrap(), CouponType::Percentage);
        assert!("bogus".parse::<CouponType>().is_err());
        assert_eq!(serde_json::to_value(CouponType::Fixed).unwrap(), "fixed");
    }
}
