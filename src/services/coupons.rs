//! Coupon administration, validation and redemption.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::coupon::{CouponPatch, NewCoupon};
use crate::domain::aggregates::{Coupon, CouponError};
use crate::domain::value_objects::{non_negative_amount, CouponCode};
use crate::repository::CouponRepository;
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct AmountQuery {
    #[validate(custom = "non_negative_amount")]
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub coupon: Coupon,
}

#[derive(Debug, Serialize)]
pub struct AppliedCoupon {
    pub coupon: Coupon,
    pub discount: Decimal,
}

fn not_found() -> CommerceError { CommerceError::NotFound("Coupon not found".to_string()) }

#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponRepository>) -> Self { Self { coupons } }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: NewCoupon) -> Result<Coupon> {
        input.validate()?;
        let coupon = self.coupons.insert(&Coupon::create(input)?).await?;
        info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> { self.coupons.list().await }

    pub async fn get(&self, id: Uuid) -> Result<Coupon> {
        self.coupons.find(id).await?.ok_or_else(not_found)
    }

    /// Case-insensitive lookup.
    pub async fn find_by_code(&self, code: &str) -> Result<Coupon> {
        let Ok(code) = CouponCode::new(code) else { return Err(not_found()) };
        self.coupons.find_by_code(&code).await?.ok_or_else(not_found)
    }

    pub async fn update(&self, id: Uuid, patch: CouponPatch) -> Result<Coupon> {
        patch.validate()?;
        let mut coupon = self.get(id).await?;
        coupon.apply_patch(patch)?;
        self.coupons.update(&coupon).await?.ok_or_else(not_found)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.coupons.delete(id).await? {
            return Err(not_found());
        }
        Ok(())
    }

    /// Checks the coupon against `amount` without touching its usage count.
    pub async fn validate(&self, code: &str, amount: Decimal) -> Result<Coupon> {
        let coupon = self.find_by_code(code).await?;
        coupon.check_eligibility(amount, Utc::now())?;
        Ok(coupon)
    }

    /// Validates, computes the discount, then redeems. The redemption is a conditional write,
    /// so concurrent applications can never push `usage_count` past `usage_limit`.
    #[instrument(skip(self), fields(code = %code, amount = %amount))]
    pub async fn apply(&self, code: &str, amount: Decimal) -> Result<AppliedCoupon> {
        let coupon = self.validate(code, amount).await?;
        let discount = coupon.discount_for(amount);
        let Some(coupon) = self.coupons.redeem(coupon.id).await? else {
            warn!(coupon_id = %coupon.id, "Coupon redemption lost a race for its last use");
            return Err(CouponError::UsageLimitReached.into());
        };
        info!(coupon_id = %coupon.id, usage_count = coupon.usage_count, %discount, "Coupon applied");
        Ok(AppliedCoupon { coupon, discount })
    }
}
