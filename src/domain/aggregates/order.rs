//! Order Aggregate
//!
//! Fulfillment status and payment status move independently, each through its own
//! transition table. Every change raises an [`OrderEvent`] that the caller persists in the
//! outbox together with the order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{non_empty_list, non_negative_amount, OrderNumber};
use crate::CommerceError;

pub const CASH_ON_DELIVERY: &str = "cash_on_delivery";

text_enum! {
    pub enum OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
                | (Delivered, Refunded)
                | (Cancelled, Refunded)
        )
    }
}

text_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
    }
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Pending) | (Failed, Paid) | (Paid, Refunded)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub items: Value,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub shipping_address: Value,
    pub billing_address: Value,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checkout payload.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewOrder {
    #[validate(custom = "non_empty_list")]
    pub items: Value,
    #[validate(custom = "non_negative_amount")]
    pub subtotal: Decimal,
    #[validate(custom = "non_negative_amount")]
    pub discount: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub tax: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub shipping: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub total: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub payment_method: Option<String>,
    pub shipping_address: Value,
    pub billing_address: Value,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Admin patch; absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct OrderPatch {
    #[validate(custom = "non_empty_list")]
    pub items: Option<Value>,
    #[validate(custom = "non_negative_amount")]
    pub subtotal: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub discount: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub tax: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub shipping: Option<Decimal>,
    #[validate(custom = "non_negative_amount")]
    pub total: Option<Decimal>,
    #[validate(length(min = 1, max = 64))]
    pub payment_method: Option<String>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    #[validate(length(max = 128))]
    pub tracking_number: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl Order {
    pub fn place(new: NewOrder, user_id: Option<Uuid>) -> (Self, OrderEvent) {
        let now = Utc::now();
        let order = Self {
            id: Uuid::now_v7(),
            order_number: OrderNumber::generate(now).into_string(),
            user_id,
            items: new.items,
            subtotal: new.subtotal,
            discount: new.discount.unwrap_or_default(),
            tax: new.tax.unwrap_or_default(),
            shipping: new.shipping.unwrap_or_default(),
            total: new.total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: new.payment_method,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            tracking_number: None,
            notes: new.notes,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let event = OrderEvent::Placed { order_id: order.id };
        (order, event)
    }

    pub fn is_cash_on_delivery(&self) -> bool { self.payment_method.as_deref() == Some(CASH_ON_DELIVERY) }

    /// Setting the current status again is accepted and raises nothing.
    pub fn set_status(&mut self, next: OrderStatus) -> Result<Option<OrderEvent>, OrderError> {
        let from = self.status;
        if from == next { return Ok(None); }
        if !from.can_transition_to(next) { return Err(OrderError::IllegalStatus { from, to: next }); }
        self.status = next;
        self.touch();
        Ok(Some(OrderEvent::StatusChanged { order_id: self.id, from, to: next }))
    }

    pub fn set_payment_status(&mut self, next: PaymentStatus) -> Result<Option<OrderEvent>, OrderError> {
        let from = self.payment_status;
        if from == next { return Ok(None); }
        if !from.can_transition_to(next) { return Err(OrderError::IllegalPaymentStatus { from, to: next }); }
        self.payment_status = next;
        self.touch();
        Ok(Some(OrderEvent::PaymentStatusChanged { order_id: self.id, from, to: next }))
    }

    /// Applies every present field. Transitions are checked before anything is written, so a
    /// rejected patch leaves the order untouched.
    pub fn apply_patch(&mut self, patch: OrderPatch) -> Result<Vec<OrderEvent>, OrderError> {
        if let Some(next) = patch.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(OrderError::IllegalStatus { from: self.status, to: next });
            }
        }
        if let Some(next) = patch.payment_status {
            if next != self.payment_status && !self.payment_status.can_transition_to(next) {
                return Err(OrderError::IllegalPaymentStatus { from: self.payment_status, to: next });
            }
        }

        if let Some(items) = patch.items { self.items = items; }
        if let Some(v) = patch.subtotal { self.subtotal = v; }
        if let Some(v) = patch.discount { self.discount = v; }
        if let Some(v) = patch.tax { self.tax = v; }
        if let Some(v) = patch.shipping { self.shipping = v; }
        if let Some(v) = patch.total { self.total = v; }
        if let Some(v) = patch.payment_method { self.payment_method = Some(v); }
        if let Some(v) = patch.shipping_address { self.shipping_address = v; }
        if let Some(v) = patch.billing_address { self.billing_address = v; }
        if let Some(v) = patch.tracking_number { self.tracking_number = Some(v); }
        if let Some(v) = patch.notes { self.notes = Some(v); }
        self.touch();

        let mut events = Vec::new();
        if let Some(next) = patch.status { events.extend(self.set_status(next)?); }
        if let Some(next) = patch.payment_status { events.extend(self.set_payment_status(next)?); }
        Ok(events)
    }

    /// Confirms an offline payment: marks the order paid and moves a pending order on to
    /// processing, both in the same change.
    pub fn validate_cash_payment(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.is_cash_on_delivery() { return Err(OrderError::NotCashOnDelivery); }
        if self.payment_status == PaymentStatus::Paid { return Err(OrderError::AlreadyPaid); }
        if !self.payment_status.can_transition_to(PaymentStatus::Paid) {
            return Err(OrderError::IllegalPaymentStatus { from: self.payment_status, to: PaymentStatus::Paid });
        }

        let mut events = Vec::new();
        events.extend(self.set_payment_status(PaymentStatus::Paid)?);
        if self.status == OrderStatus::Pending {
            events.extend(self.set_status(OrderStatus::Processing)?);
        }
        Ok(events)
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Cannot change order status from {from} to {to}")]
    IllegalStatus { from: OrderStatus, to: OrderStatus },
    #[error("Cannot change payment status from {from} to {to}")]
    IllegalPaymentStatus { from: PaymentStatus, to: PaymentStatus },
    #[error("This order is not a cash on delivery payment")]
    NotCashOnDelivery,
    #[error("This payment has already been validated")]
    AlreadyPaid,
}

impl From<OrderError> for CommerceError {
    fn from(e: OrderError) -> Self { CommerceError::BadRequest(e.to_string()) }
}
