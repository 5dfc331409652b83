//! Payment transactions and refunds.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::payment::DEFAULT_CURRENCY;
use crate::domain::aggregates::{PaymentTransaction, Refund, TransactionStatus};
use crate::domain::value_objects::positive_amount;
use crate::repository::PaymentRepository;
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct NewTransaction {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub transaction_id: String,
    #[validate(length(min = 1, max = 64))]
    pub payment_provider: String,
    #[validate(custom = "positive_amount")]
    pub amount: Decimal,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub status: Option<TransactionStatus>,
    pub payment_method_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusUpdate {
    pub status: TransactionStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    pub order_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    #[validate(custom = "positive_amount")]
    pub amount: Decimal,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundDecision {
    pub approved: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
}

impl PaymentService {
    pub fn new(payments: Arc<dyn PaymentRepository>) -> Self { Self { payments } }

    #[instrument(skip(self, input), fields(order_id = %input.order_id, provider = %input.payment_provider))]
    pub async fn create_transaction(&self, input: NewTransaction) -> Result<PaymentTransaction> {
        input.validate()?;
        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: Uuid::now_v7(),
            order_id: input.order_id,
            transaction_id: input.transaction_id,
            payment_provider: input.payment_provider,
            amount: input.amount,
            currency: input.currency.map(|c| c.to_uppercase()).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status: input.status.unwrap_or(TransactionStatus::Pending),
            payment_method_details: input.payment_method_details,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = self.payments.insert_transaction(&transaction).await?;
        info!(transaction_id = %transaction.transaction_id, status = %transaction.status, "Payment transaction recorded");
        Ok(transaction)
    }

    pub async fn transactions_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        self.payments.transactions_for_order(order_id).await
    }

    /// Looked up by the provider's transaction id.
    pub async fn update_transaction_status(
        &self,
        transaction_id: &str,
        input: TransactionStatusUpdate,
    ) -> Result<PaymentTransaction> {
        let mut transaction = self
            .payments
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Transaction not found".to_string()))?;
        transaction.record_status(input.status, input.error_message);
        self.payments.update_transaction(&transaction).await
    }

    pub async fn request_refund(&self, input: RefundRequest) -> Result<Refund> {
        input.validate()?;
        if input.order_id.is_none() && input.transaction_id.is_none() {
            return Err(CommerceError::BadRequest("A refund needs an order or a transaction".to_string()));
        }
        let refund = Refund::request(input.order_id, input.transaction_id, input.amount, input.reason);
        let refund = self.payments.insert_refund(&refund).await?;
        info!(refund_id = %refund.id, amount = %refund.amount, "Refund requested");
        Ok(refund)
    }

    pub async fn list_refunds(&self) -> Result<Vec<Refund>> { self.payments.list_refunds().await }

    pub async fn process_refund(&self, id: Uuid, decision: RefundDecision, processed_by: Uuid) -> Result<Refund> {
        let mut refund = self
            .payments
            .find_refund(id)
            .await?
            .ok_or_else(|| CommerceError::NotFound("Refund not found".to_string()))?;
        refund.process(decision.approved, processed_by)?;
        let refund = self.payments.update_refund(&refund).await?;
        info!(refund_id = %refund.id, status = %refund.status, "Refund processed");
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::new_order;
    use crate::domain::aggregates::{Order, RefundStatus};
    use crate::repository::Repositories;

    async fn setup() -> (PaymentService, Order) {
        let repos = Repositories::in_memory();
        let (order, placed) = Order::place(new_order(None), None);
        let order = repos.orders.insert(&order, &[placed]).await.unwrap();
        (PaymentService::new(repos.payments), order)
    }

    fn new_transaction(order_id: Uuid) -> NewTransaction {
        NewTransaction {
            order_id, transaction_id: "pi_123".into(), payment_provider: "stripe".into(),
            amount: Decimal::new(2700, 2), currency: None, status: None, payment_method_details: None,
        }
    }

    #[tokio::test]
    async fn test_transaction_defaults_and_status_update() {
        let (payments, order) = setup().await;
        let tx = payments.create_transaction(new_transaction(order.id)).await.unwrap();
        assert_eq!(tx.currency, "EUR");
        assert_eq!(tx.status, TransactionStatus::Pending);

        let update = TransactionStatusUpdate { status: TransactionStatus::Failed, error_message: Some("declined".into()) };
        let tx = payments.update_transaction_status("pi_123", update).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.error_message.as_deref(), Some("declined"));
        assert_eq!(payments.transactions_for_order(order.id).await.unwrap().len(), 1);

        let missing = TransactionStatusUpdate { status: TransactionStatus::Succeeded, error_message: None };
        assert!(matches!(payments.update_transaction_status("pi_x", missing).await, Err(CommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_order_is_rejected() {
        let (payments, _) = setup().await;
        let err = payments.create_transaction(new_transaction(Uuid::now_v7())).await.unwrap_err();
        assert!(matches!(err, CommerceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_refund_is_processed_once() {
        let (payments, order) = setup().await;
        let admin = Uuid::now_v7();
        let request = RefundRequest { order_id: Some(order.id), transaction_id: None, amount: Decimal::new(10, 0), reason: None };
        let refund = payments.request_refund(request).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Requested);

        let refund = payments.process_refund(refund.id, RefundDecision { approved: false }, admin).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Rejected);
        assert!(payments.process_refund(refund.id, RefundDecision { approved: true }, admin).await.is_err());
        assert_eq!(payments.list_refunds().await.unwrap().len(), 1);
    }
}
