//! Drains the notification outbox.
//!
//! Each tick claims a batch of pending messages, emails the customer and marks every message
//! `sent` or `failed`. A failed message is not retried. A claim that was never marked (a crash,
//! or a storage error while marking) expires after the lease and the message is claimed again,
//! up to [`MAX_ATTEMPTS`]. Order writes never wait on any of this.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::mailer::{MailError, Mailer};
use super::templates::{self, Recipient};
use crate::domain::aggregates::Order;
use crate::domain::events::OutboxMessage;
use crate::repository::{OrderRepository, OutboxRepository, Repositories, UserRepository};
use crate::CommerceError;

pub const SUBJECT_PREFIX: &str = "storefront.orders";
pub const MAX_ATTEMPTS: i32 = 5;
const DEFAULT_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Order no longer exists")]
    OrderMissing,
    #[error("No recipient email for order {0}")]
    NoRecipient(String),
    #[error("Gave up after {0} attempts")]
    TooManyAttempts(i32),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Storage(#[from] CommerceError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    outbox: Arc<dyn OutboxRepository>,
    mailer: Arc<dyn Mailer>,
    nats: Option<async_nats::Client>,
    batch_size: i64,
    lease: Duration,
}

impl Dispatcher {
    pub fn new(repos: &Repositories, mailer: Arc<dyn Mailer>, batch_size: i64) -> Self {
        Self {
            orders: repos.orders.clone(),
            users: repos.users.clone(),
            outbox: repos.outbox.clone(),
            mailer,
            nats: None,
            batch_size,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_nats(mut self, client: async_nats::Client) -> Self {
        self.nats = Some(client);
        self
    }

    /// One pass over the outbox. Only the claim itself can fail the pass; a message that
    /// cannot be marked stays claimed until its lease runs out.
    pub async fn dispatch_pending(&self) -> Result<DispatchReport, CommerceError> {
        let lease = chrono::Duration::from_std(self.lease).unwrap_or_else(|_| chrono::Duration::minutes(5));
        let messages = self.outbox.claim_pending(self.batch_size, Utc::now() - lease).await?;
        let mut report = DispatchReport::default();
        for message in messages {
            let outcome = if message.attempts > MAX_ATTEMPTS {
                Err(DeliveryError::TooManyAttempts(MAX_ATTEMPTS))
            } else {
                self.publish(&message).await;
                self.deliver(&message).await
            };
            let marked = match outcome {
                Ok(()) => self.outbox.mark_sent(message.id).await.map(|()| report.sent += 1),
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        order_id = %message.order_id,
                        event = message.event.name(),
                        attempts = message.attempts,
                        error = %e,
                        "Order notification failed"
                    );
                    self.outbox.mark_failed(message.id, &e.to_string()).await.map(|()| report.failed += 1)
                }
            };
            if let Err(e) = marked {
                error!(message_id = %message.id, error = %e, "Could not record outbox delivery; the claim will expire");
            }
        }
        if report != DispatchReport::default() {
            info!(sent = report.sent, failed = report.failed, "Outbox batch dispatched");
        }
        Ok(report)
    }

    /// Polls until `shutdown` flips.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, batch_size = self.batch_size, "Notification dispatcher started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_pending().await {
                        error!(error = %e, "Outbox dispatch pass failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Notification dispatcher stopped");
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<(), DeliveryError> {
        let order = self.orders.find(message.order_id).await?.ok_or(DeliveryError::OrderMissing)?;
        let recipient = self
            .recipient(&order)
            .await?
            .ok_or_else(|| DeliveryError::NoRecipient(order.order_number.clone()))?;
        let email = templates::render(&message.event, &order, recipient);
        self.mailer.send(&email).await?;
        Ok(())
    }

    /// The ordering user when known, else the email on the shipping address.
    async fn recipient(&self, order: &Order) -> Result<Option<Recipient>, CommerceError> {
        if let Some(user_id) = order.user_id {
            if let Some(user) = self.users.find(user_id).await? {
                return Ok(Some(Recipient { name: user.display_name(), email: user.email }));
            }
        }
        let address = &order.shipping_address;
        let field = |key: &str| address.get(key).and_then(Value::as_str).map(str::to_string);
        Ok(field("email").filter(|e| !e.is_empty()).map(|email| Recipient {
            email,
            name: field("full_name").or_else(|| field("name")),
        }))
    }

    async fn publish(&self, message: &OutboxMessage) {
        let Some(client) = &self.nats else { return };
        let subject = format!("{SUBJECT_PREFIX}.{}", message.event.name());
        let payload = match serde_json::to_vec(&message.event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not serialize order event");
                return;
            }
        };
        match client.publish(subject.clone(), payload.into()).await {
            Ok(()) => debug!(%subject, "Order event published"),
            Err(e) => warn!(%subject, error = %e, "Order event publish failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::new_order;
    use crate::domain::aggregates::{OrderStatus, Role, User};
    use crate::domain::events::OutboxStatus;
    use crate::notifications::mailer::MockMailer;
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    /// Wraps a real outbox; the first `mark_sent` fails as if the database went away.
    struct FlakyOutbox {
        inner: Arc<dyn OutboxRepository>,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl OutboxRepository for FlakyOutbox {
        async fn claim_pending(&self, limit: i64, stale_before: DateTime<Utc>) -> crate::Result<Vec<OutboxMessage>> {
            self.inner.claim_pending(limit, stale_before).await
        }

        async fn mark_sent(&self, id: Uuid) -> crate::Result<()> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(CommerceError::Internal("connection reset".into()));
            }
            self.inner.mark_sent(id).await
        }

        async fn mark_failed(&self, id: Uuid, error: &str) -> crate::Result<()> {
            self.inner.mark_failed(id, error).await
        }

        async fn list_for_order(&self, order_id: Uuid) -> crate::Result<Vec<OutboxMessage>> {
            self.inner.list_for_order(order_id).await
        }
    }

    async fn place(repos: &Repositories, user_id: Option<Uuid>, shipping: Value) -> Order {
        let mut input = new_order(None);
        input.shipping_address = shipping;
        let (order, placed) = Order::place(input, user_id);
        repos.orders.insert(&order, &[placed]).await.unwrap()
    }

    #[tokio::test]
    async fn test_sent_messages_are_marked() {
        let repos = Repositories::in_memory();
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(), email: "buyer@example.com".into(), password_hash: None,
            first_name: Some("Awa".into()), last_name: None, phone: None, role: Role::Customer,
            created_at: now, updated_at: now,
        };
        repos.users.insert(&user).await.unwrap();
        let order = place(&repos, Some(user.id), json!({})).await;

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| m.to.email == "buyer@example.com" && m.subject.starts_with("Order confirmation"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = Dispatcher::new(&repos, Arc::new(mailer), 10);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport { sent: 1, failed: 0 });

        let outbox = repos.outbox.list_for_order(order.id).await.unwrap();
        assert_eq!(outbox[0].status, OutboxStatus::Sent);
        assert!(outbox[0].dispatched_at.is_some());
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport::default());
    }

    #[tokio::test]
    async fn test_mail_failure_marks_message_failed() {
        let repos = Repositories::in_memory();
        let order = place(&repos, None, json!({"email": "guest@example.com"})).await;
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(1)
            .returning(|_| Err(MailError::Rejected { status: 500, body: "boom".into() }));

        let dispatcher = Dispatcher::new(&repos, Arc::new(mailer), 10);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport { sent: 0, failed: 1 });

        let outbox = repos.outbox.list_for_order(order.id).await.unwrap();
        assert_eq!(outbox[0].status, OutboxStatus::Failed);
        assert!(outbox[0].last_error.as_deref().is_some_and(|e| e.contains("boom")));
        assert_eq!(repos.orders.find(order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_sending() {
        let repos = Repositories::in_memory();
        let order = place(&repos, None, json!({"city": "Dakar"})).await;
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();

        let dispatcher = Dispatcher::new(&repos, Arc::new(mailer), 10);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap().failed, 1);
        let outbox = repos.outbox.list_for_order(order.id).await.unwrap();
        assert_eq!(outbox[0].last_error, Some(format!("No recipient email for order {}", order.order_number)));
    }

    #[tokio::test]
    async fn test_marking_error_does_not_strand_the_batch() {
        let mut repos = Repositories::in_memory();
        let store = repos.outbox.clone();
        repos.outbox = Arc::new(FlakyOutbox { inner: store.clone(), tripped: AtomicBool::new(false) });
        let first = place(&repos, None, json!({"email": "one@example.com"})).await;
        let second = place(&repos, None, json!({"email": "two@example.com"})).await;

        let mut mailer = MockMailer::new();
        mailer.expect_send().times(3).returning(|_| Ok(()));
        let dispatcher = Dispatcher::new(&repos, Arc::new(mailer), 10);

        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport { sent: 1, failed: 0 });
        assert_eq!(store.list_for_order(first.id).await.unwrap()[0].status, OutboxStatus::Dispatching);
        assert_eq!(store.list_for_order(second.id).await.unwrap()[0].status, OutboxStatus::Sent);

        // Within the lease the unmarked claim is left alone.
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport::default());

        let dispatcher = dispatcher.with_lease(Duration::ZERO);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport { sent: 1, failed: 0 });
        let message = store.list_for_order(first.id).await.unwrap().remove(0);
        assert_eq!(message.status, OutboxStatus::Sent);
        assert_eq!(message.attempts, 2);
    }

    #[tokio::test]
    async fn test_claims_past_max_attempts_are_failed() {
        let repos = Repositories::in_memory();
        let order = place(&repos, None, json!({"email": "guest@example.com"})).await;
        let stale = Utc::now() + chrono::Duration::seconds(1);
        for _ in 0..MAX_ATTEMPTS {
            repos.outbox.claim_pending(10, stale).await.unwrap();
        }
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();

        let dispatcher = Dispatcher::new(&repos, Arc::new(mailer), 10).with_lease(Duration::ZERO);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), DispatchReport { sent: 0, failed: 1 });
        let message = repos.outbox.list_for_order(order.id).await.unwrap().remove(0);
        assert_eq!(message.status, OutboxStatus::Failed);
        assert_eq!(message.last_error.as_deref(), Some("Gave up after 5 attempts"));
    }
}
