//! Payment transactions and refunds
//!
//! These records mirror the state of an external payment provider. They are written
//! directly and never reconciled against the order's payment status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::CommerceError;

pub const DEFAULT_CURRENCY: &str = "EUR";

text_enum! {
    pub enum TransactionStatus {
        Pending => "pending",
        Processing => "processing",
        Succeeded => "succeeded",
        Failed => "failed",
        Refunded => "refunded",
    }
}

text_enum! {
    pub enum RefundStatus {
        Requested => "requested",
        Approved => "approved",
        Rejected => "rejected",
        Processed => "processed",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_id: String,
    pub payment_provider: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method_details: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn record_status(&mut self, status: TransactionStatus, error_message: Option<String>) {
        self.status = status;
        if error_message.is_some() { self.error_message = error_message; }
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub processed_by: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn request(order_id: Option<Uuid>, transaction_id: Option<Uuid>, amount: Decimal, reason: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, transaction_id, amount, reason,
            status: RefundStatus::Requested, processed_by: None,
            requested_at: Utc::now(), processed_at: None,
        }
    }

    /// Approves or rejects a pending request. A refund is decided once.
    pub fn process(&mut self, approved: bool, processed_by: Uuid) -> Result<(), PaymentError> {
        if self.status != RefundStatus::Requested { return Err(PaymentError::RefundAlreadyProcessed(self.status)); }
        self.status = if approved { RefundStatus::Approved } else { RefundStatus::Rejected };
        self.processed_by = Some(processed_by);
        self.processed_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Refund has already been {0}")]
    RefundAlreadyProcessed(RefundStatus),
}

impl From<PaymentError> for CommerceError {
    fn from(e: PaymentError) -> Self { CommerceError::BadRequest(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_is_processed_once() {
        let admin = Uuid::now_v7();
        let mut refund = Refund::request(None, None, Decimal::new(1250, 2), Some("damaged".into()));
        assert_eq!(refund.status, RefundStatus::Requested);
        refund.process(true, admin).unwrap();
        assert_eq!(refund.status, RefundStatus::Approved);
        assert_eq!(refund.processed_by, Some(admin));
        assert!(refund.processed_at.is_some());
        assert_eq!(refund.process(false, admin), Err(PaymentError::RefundAlreadyProcessed(RefundStatus::Approved)));
    }

    #[test]
    fn test_record_status_keeps_previous_error() {
        let now = Utc::now();
        let mut tx = PaymentTransaction {
            id: Uuid::now_v7(), order_id: Uuid::now_v7(), transaction_id: "pi_1".into(),
            payment_provider: "stripe".into(), amount: Decimal::new(10, 0), currency: DEFAULT_CURRENCY.into(),
            status: TransactionStatus::Pending, payment_method_details: None, error_message: None,
            created_at: now, updated_at: now,
        };
        tx.record_status(TransactionStatus::Failed, Some("card declined".into()));
        tx.record_status(TransactionStatus::Processing, None);
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert_eq!(tx.error_message.as_deref(), Some("card declined"));
    }
}
