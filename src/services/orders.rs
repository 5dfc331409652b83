//! Order lifecycle.
//!
//! Every mutation is a read-modify-write guarded by the order's `version`: the repository
//! refuses the write when another request got there first, and the caller gets a 409. The
//! events raised by the change are queued in the outbox by the same write.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::Actor;
use crate::domain::aggregates::order::{NewOrder, OrderPatch};
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::domain::events::OrderEvent;
use crate::repository::OrderRepository;
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusUpdate {
    pub payment_status: PaymentStatus,
}

fn not_found() -> CommerceError { CommerceError::NotFound("Order not found".to_string()) }

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self { Self { orders } }

    #[instrument(skip(self, input), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, input: NewOrder) -> Result<Order> {
        input.validate()?;
        let (order, placed) = Order::place(input, Some(actor.user_id));
        let order = self.orders.insert(&order, &[placed]).await?;
        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "Order placed");
        Ok(order)
    }

    /// Admins see every order; customers only their own.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<Order>> {
        let owner = (!actor.is_admin).then_some(actor.user_id);
        self.orders.list(owner).await
    }

    /// Another customer's order is reported as missing.
    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Order> {
        let order = self.find(id).await?;
        if !actor.is_admin && order.user_id != Some(actor.user_id) {
            return Err(not_found());
        }
        Ok(order)
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<Order> {
        self.orders.find_by_number(order_number).await?.ok_or_else(not_found)
    }

    pub async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<Order> {
        patch.validate()?;
        self.mutate(id, move |order| Ok(Some(order.apply_patch(patch)?))).await
    }

    pub async fn update_status(&self, id: Uuid, input: StatusUpdate) -> Result<Order> {
        self.mutate(id, move |order| Ok(order.set_status(input.status)?.map(|e| vec![e]))).await
    }

    pub async fn update_payment_status(&self, id: Uuid, input: PaymentStatusUpdate) -> Result<Order> {
        self.mutate(id, move |order| Ok(order.set_payment_status(input.payment_status)?.map(|e| vec![e])))
            .await
    }

    /// Confirms a cash-on-delivery payment. Both status changes land in one write.
    pub async fn validate_cash_payment(&self, id: Uuid) -> Result<Order> {
        self.mutate(id, |order| Ok(Some(order.validate_cash_payment()?))).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.orders.delete(id).await? {
            return Err(not_found());
        }
        info!(order_id = %id, "Order deleted");
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Order> {
        self.orders.find(id).await?.ok_or_else(not_found)
    }

    /// `change` returns `None` when it left the order as it was; nothing is written then.
    async fn mutate<F>(&self, id: Uuid, change: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<Option<Vec<OrderEvent>>> + Send,
    {
        let mut order = self.find(id).await?;
        let Some(events) = change(&mut order)? else { return Ok(order) };

        match self.orders.update(&order, &events).await? {
            Some(updated) => {
                info!(
                    order_id = %updated.id,
                    status = %updated.status,
                    payment_status = %updated.payment_status,
                    events = events.len(),
                    "Order updated"
                );
                Ok(updated)
            }
            None => {
                warn!(order_id = %id, version = order.version, "Order write lost to a concurrent update");
                Err(CommerceError::Conflict("Order was modified concurrently, please retry".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::new_order;
    use crate::domain::aggregates::CASH_ON_DELIVERY;
    use crate::domain::events::OutboxStatus;
    use crate::repository::{MockOrderRepository, Repositories};

    struct Fixture {
        repos: Repositories,
        orders: OrderService,
        customer: Actor,
        admin: Actor,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        Fixture {
            orders: OrderService::new(repos.orders.clone()),
            repos,
            customer: Actor { user_id: Uuid::now_v7(), is_admin: false },
            admin: Actor { user_id: Uuid::now_v7(), is_admin: true },
        }
    }

    // Orders are placed without an owner here so the in-memory user reference check passes.
    async fn place(f: &Fixture, payment_method: Option<&str>) -> Order {
        let (order, placed) = Order::place(new_order(payment_method), None);
        f.repos.orders.insert(&order, &[placed]).await.unwrap()
    }

    #[tokio::test]
    async fn test_status_change_queues_event() {
        let f = fixture();
        let order = place(&f, None).await;
        let updated = f.orders.update_status(order.id, StatusUpdate { status: OrderStatus::Processing }).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(updated.version, 1);

        let outbox = f.repos.outbox.list_for_order(order.id).await.unwrap();
        assert_eq!(outbox.len(), 2);
        assert!(outbox.iter().all(|m| m.status == OutboxStatus::Pending));
        assert_eq!(
            outbox[1].event,
            OrderEvent::StatusChanged { order_id: order.id, from: OrderStatus::Pending, to: OrderStatus::Processing }
        );
    }

    #[tokio::test]
    async fn test_same_status_writes_nothing() {
        let f = fixture();
        let order = place(&f, None).await;
        let same = f.orders.update_status(order.id, StatusUpdate { status: OrderStatus::Pending }).await.unwrap();
        assert_eq!(same.version, 0);
        assert_eq!(f.repos.outbox.list_for_order(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_order_unchanged() {
        let f = fixture();
        let order = place(&f, None).await;
        let err = f.orders.update_status(order.id, StatusUpdate { status: OrderStatus::Delivered }).await.unwrap_err();
        assert!(matches!(err, CommerceError::BadRequest(_)));
        let stored = f.orders.get(&f.admin, order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_cash_payment_validation() {
        let f = fixture();
        let order = place(&f, Some(CASH_ON_DELIVERY)).await;
        let paid = f.orders.validate_cash_payment(order.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Processing);
        assert_eq!(f.repos.outbox.list_for_order(order.id).await.unwrap().len(), 3);

        let err = f.orders.validate_cash_payment(order.id).await.unwrap_err();
        assert!(matches!(err, CommerceError::BadRequest(ref m) if m == "This payment has already been validated"));
        assert_eq!(f.orders.get(&f.admin, order.id).await.unwrap(), paid);

        let card = place(&f, Some("card")).await;
        assert!(f.orders.validate_cash_payment(card.id).await.is_err());
    }

    #[tokio::test]
    async fn test_customers_only_see_their_orders() {
        let f = fixture();
        let order = place(&f, None).await;
        assert!(f.orders.list(&f.customer).await.unwrap().is_empty());
        assert_eq!(f.orders.list(&f.admin).await.unwrap().len(), 1);
        assert!(matches!(f.orders.get(&f.customer, order.id).await, Err(CommerceError::NotFound(_))));
        assert_eq!(f.orders.get_by_number(&order.order_number).await.unwrap().id, order.id);
    }

    #[tokio::test]
    async fn test_stale_write_is_a_conflict() {
        let (order, _) = Order::place(new_order(None), None);
        let id = order.id;
        let mut repo = MockOrderRepository::new();
        repo.expect_find().returning(move |_| Ok(Some(order.clone())));
        repo.expect_update().times(1).returning(|_, _| Ok(None));

        let orders = OrderService::new(Arc::new(repo));
        let err = orders.update_status(id, StatusUpdate { status: OrderStatus::Cancelled }).await.unwrap_err();
        assert!(matches!(err, CommerceError::Conflict(_)));
    }
}
