//! Domain events and the outbox records that carry them to the notification dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, PaymentStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: Uuid, from: PaymentStatus, to: PaymentStatus },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Placed { order_id }
            | Self::StatusChanged { order_id, .. }
            | Self::PaymentStatusChanged { order_id, .. } => *order_id,
        }
    }

    /// Stable name used for NATS subjects and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::StatusChanged { .. } => "status_changed",
            Self::PaymentStatusChanged { .. } => "payment_status_changed",
        }
    }
}

text_enum! {
    pub enum OutboxStatus {
        Pending => "pending",
        Dispatching => "dispatching",
        Sent => "sent",
        Failed => "failed",
    }
}

/// An order event persisted alongside the order write that raised it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event: OrderEvent,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when a dispatcher claims the message. A `dispatching` message whose claim is
    /// older than the dispatcher's lease is claimed again.
    pub claimed_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(event: OrderEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id: event.order_id(),
            event,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            claimed_at: None,
            dispatched_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let id = Uuid::now_v7();
        let event = OrderEvent::StatusChanged { order_id: id, from: OrderStatus::Pending, to: OrderStatus::Processing };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["from"], "pending");
        assert_eq!(json["to"], "processing");
        assert_eq!(serde_json::from_value::<OrderEvent>(json).unwrap(), event);
    }

    #[test]
    fn test_outbox_message_starts_pending() {
        let id = Uuid::now_v7();
        let message = OutboxMessage::new(OrderEvent::Placed { order_id: id });
        assert_eq!(message.order_id, id);
        assert_eq!(message.status, OutboxStatus::Pending);
        assert_eq!(message.attempts, 0);
    }
}
