//! In-process adapter used when no database is configured.
//!
//! One mutex guards all tables, so every trait method is a single atomic step, matching the
//! conditional statements of the Postgres adapter. Uniqueness and reference checks surface
//! the same errors the database constraints would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    CartRepository, CouponRepository, OrderRepository, OutboxRepository, Page, PaymentRepository,
    ProductFilter, ProductRepository, ProductSort, ShippingRepository, SupportRepository, UserRepository,
};
use crate::domain::aggregates::{
    Cart, Coupon, CouponError, Order, PaymentTransaction, Product, ProductStatus, Refund, ShippingMethod,
    SupportTicket, TicketMessage, User,
};
use crate::domain::events::{OrderEvent, OutboxMessage, OutboxStatus};
use crate::domain::value_objects::CouponCode;
use crate::{CommerceError, Result};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    orders: HashMap<Uuid, Order>,
    transactions: HashMap<Uuid, PaymentTransaction>,
    refunds: HashMap<Uuid, Refund>,
    shipping_methods: HashMap<Uuid, ShippingMethod>,
    tickets: HashMap<Uuid, SupportTicket>,
    outbox: Vec<OutboxMessage>,
}

impl Tables {
    fn enqueue(&mut self, events: &[OrderEvent]) {
        self.outbox.extend(events.iter().cloned().map(OutboxMessage::new));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn duplicate() -> CommerceError { CommerceError::Conflict("Resource already exists".to_string()) }

fn missing_reference() -> CommerceError {
    CommerceError::BadRequest("Referenced resource does not exist".to_string())
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<User> {
        let mut t = self.tables.lock();
        if t.users.values().any(|u| u.email == user.email) { return Err(duplicate()); }
        t.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<User>> { Ok(self.tables.lock().users.get(&id).cloned()) }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.tables.lock().users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list(&self, filter: &ProductFilter, page: Page) -> Result<(Vec<Product>, i64)> {
        let t = self.tables.lock();
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let matching: Vec<Product> = t
            .products
            .values()
            .filter(|p| filter.include_inactive || p.status == ProductStatus::Active)
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .filter(|p| filter.min_price.map_or(true, |min| p.price >= min))
            .filter(|p| filter.max_price.map_or(true, |max| p.price <= max))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let mut sorted = newest_first(matching, |p| p.created_at);
        match filter.sort {
            ProductSort::Newest => {}
            ProductSort::PriceAsc => sorted.sort_by(|a, b| a.price.cmp(&b.price)),
            ProductSort::PriceDesc => sorted.sort_by(|a, b| b.price.cmp(&a.price)),
        }
        let data = sorted
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok((data, total))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Product>> { Ok(self.tables.lock().products.get(&id).cloned()) }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        Ok(self.tables.lock().products.values().find(|p| p.slug == slug).cloned())
    }

    async fn insert(&self, product: &Product) -> Result<Product> {
        let mut t = self.tables.lock();
        if t.products.values().any(|p| p.sku == product.sku || p.slug == product.slug) { return Err(duplicate()); }
        t.products.insert(product.id, product.clone());
        Ok(product.clone())
    }

    async fn update(&self, product: &Product) -> Result<Option<Product>> {
        let mut t = self.tables.lock();
        if t.products.values().any(|p| p.id != product.id && (p.sku == product.sku || p.slug == product.slug)) {
            return Err(duplicate());
        }
        let Some(stored) = t.products.get_mut(&product.id) else { return Ok(None) };
        let stock = stored.stock;
        *stored = Product { stock, ..product.clone() };
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> { Ok(self.tables.lock().products.remove(&id).is_some()) }

    async fn set_stock(&self, id: Uuid, stock: i32) -> Result<Option<Product>> {
        let mut t = self.tables.lock();
        Ok(t.products.get_mut(&id).map(|p| {
            p.stock = stock;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<Product>> {
        let mut t = self.tables.lock();
        Ok(t.products.get_mut(&id).filter(|p| p.stock >= quantity).map(|p| {
            p.stock -= quantity;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.tables.lock().carts.get(&user_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart> {
        let mut t = self.tables.lock();
        if !t.users.contains_key(&cart.user_id) { return Err(missing_reference()); }
        let stored = t.carts.entry(cart.user_id).or_insert_with(|| cart.clone());
        stored.items = cart.items.clone();
        stored.updated_at = cart.updated_at;
        Ok(stored.clone())
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Coupon>> {
        let coupons = self.tables.lock().coupons.values().cloned().collect();
        Ok(newest_first(coupons, |c: &Coupon| c.created_at))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Coupon>> { Ok(self.tables.lock().coupons.get(&id).cloned()) }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.tables.lock().coupons.values().find(|c| c.code == code.as_str()).cloned())
    }

    async fn insert(&self, coupon: &Coupon) -> Result<Coupon> {
        let mut t = self.tables.lock();
        if t.coupons.values().any(|c| c.code == coupon.code) { return Err(duplicate()); }
        t.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon.clone())
    }

    async fn update(&self, coupon: &Coupon) -> Result<Option<Coupon>> {
        let mut t = self.tables.lock();
        if t.coupons.values().any(|c| c.id != coupon.id && c.code == coupon.code) { return Err(duplicate()); }
        let Some(stored) = t.coupons.get_mut(&coupon.id) else { return Ok(None) };
        let usage_count = stored.usage_count;
        if coupon.usage_limit.is_some_and(|limit| limit < usage_count) {
            return Err(CouponError::LimitBelowUsage(usage_count).into());
        }
        *stored = Coupon { usage_count, ..coupon.clone() };
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> { Ok(self.tables.lock().coupons.remove(&id).is_some()) }

    async fn redeem(&self, id: Uuid) -> Result<Option<Coupon>> {
        let now = Utc::now();
        let mut t = self.tables.lock();
        let redeemable = |c: &&mut Coupon| c.is_active && !c.is_exhausted() && !c.expires_at.is_some_and(|at| at <= now);
        Ok(t.coupons.get_mut(&id).filter(redeemable).map(|c| {
            c.usage_count += 1;
            c.updated_at = now;
            c.clone()
        }))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order, events: &[OrderEvent]) -> Result<Order> {
        let mut t = self.tables.lock();
        if t.orders.values().any(|o| o.order_number == order.order_number) { return Err(duplicate()); }
        if order.user_id.is_some_and(|id| !t.users.contains_key(&id)) { return Err(missing_reference()); }
        t.orders.insert(order.id, order.clone());
        t.enqueue(events);
        Ok(order.clone())
    }

    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Order>> {
        let orders = self
            .tables
            .lock()
            .orders
            .values()
            .filter(|o| user_id.is_none() || o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> { Ok(self.tables.lock().orders.get(&id).cloned()) }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        Ok(self.tables.lock().orders.values().find(|o| o.order_number == order_number).cloned())
    }

    async fn update(&self, order: &Order, events: &[OrderEvent]) -> Result<Option<Order>> {
        let mut t = self.tables.lock();
        let Some(stored) = t.orders.get_mut(&order.id) else { return Ok(None) };
        if stored.version != order.version { return Ok(None); }
        *stored = Order { version: order.version + 1, ..order.clone() };
        let updated = stored.clone();
        t.enqueue(events);
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut t = self.tables.lock();
        let removed = t.orders.remove(&id).is_some();
        if removed {
            t.outbox.retain(|m| m.order_id != id);
            let dropped: Vec<Uuid> = t.transactions.values().filter(|x| x.order_id == id).map(|x| x.id).collect();
            t.transactions.retain(|_, x| x.order_id != id);
            for refund in t.refunds.values_mut() {
                if refund.order_id == Some(id) { refund.order_id = None; }
                if refund.transaction_id.is_some_and(|x| dropped.contains(&x)) { refund.transaction_id = None; }
            }
            for ticket in t.tickets.values_mut().filter(|k| k.order_id == Some(id)) {
                ticket.order_id = None;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction> {
        let mut t = self.tables.lock();
        if !t.orders.contains_key(&transaction.order_id) { return Err(missing_reference()); }
        if t.transactions.values().any(|x| x.transaction_id == transaction.transaction_id) { return Err(duplicate()); }
        t.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction.clone())
    }

    async fn transactions_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let transactions = self
            .tables
            .lock()
            .transactions
            .values()
            .filter(|x| x.order_id == order_id)
            .cloned()
            .collect();
        Ok(newest_first(transactions, |x: &PaymentTransaction| x.created_at))
    }

    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.tables.lock().transactions.values().find(|x| x.transaction_id == transaction_id).cloned())
    }

    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction> {
        let mut t = self.tables.lock();
        let stored = t
            .transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| CommerceError::NotFound("Record not found".to_string()))?;
        stored.status = transaction.status;
        stored.error_message = transaction.error_message.clone();
        stored.updated_at = transaction.updated_at;
        Ok(stored.clone())
    }

    async fn insert_refund(&self, refund: &Refund) -> Result<Refund> {
        let mut t = self.tables.lock();
        if refund.order_id.is_some_and(|id| !t.orders.contains_key(&id))
            || refund.transaction_id.is_some_and(|id| !t.transactions.contains_key(&id))
        {
            return Err(missing_reference());
        }
        t.refunds.insert(refund.id, refund.clone());
        Ok(refund.clone())
    }

    async fn find_refund(&self, id: Uuid) -> Result<Option<Refund>> { Ok(self.tables.lock().refunds.get(&id).cloned()) }

    async fn update_refund(&self, refund: &Refund) -> Result<Refund> {
        let mut t = self.tables.lock();
        let stored = t
            .refunds
            .get_mut(&refund.id)
            .ok_or_else(|| CommerceError::NotFound("Record not found".to_string()))?;
        stored.status = refund.status;
        stored.processed_by = refund.processed_by;
        stored.processed_at = refund.processed_at;
        Ok(stored.clone())
    }

    async fn list_refunds(&self) -> Result<Vec<Refund>> {
        let refunds = self.tables.lock().refunds.values().cloned().collect();
        Ok(newest_first(refunds, |r: &Refund| r.requested_at))
    }
}

#[async_trait]
impl ShippingRepository for MemoryStore {
    async fn list(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>> {
        let mut methods: Vec<ShippingMethod> = self
            .tables
            .lock()
            .shipping_methods
            .values()
            .filter(|m| include_inactive || m.is_active)
            .cloned()
            .collect();
        methods.sort_by(|a, b| a.price.cmp(&b.price).then(a.created_at.cmp(&b.created_at)));
        Ok(methods)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ShippingMethod>> {
        Ok(self.tables.lock().shipping_methods.get(&id).cloned())
    }

    async fn insert(&self, method: &ShippingMethod) -> Result<ShippingMethod> {
        self.tables.lock().shipping_methods.insert(method.id, method.clone());
        Ok(method.clone())
    }

    async fn update(&self, method: &ShippingMethod) -> Result<Option<ShippingMethod>> {
        let mut t = self.tables.lock();
        let Some(stored) = t.shipping_methods.get_mut(&method.id) else { return Ok(None) };
        let created_at = stored.created_at;
        *stored = ShippingMethod { created_at, ..method.clone() };
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> { Ok(self.tables.lock().shipping_methods.remove(&id).is_some()) }
}

#[async_trait]
impl SupportRepository for MemoryStore {
    async fn insert_ticket(&self, ticket: &SupportTicket) -> Result<SupportTicket> {
        let mut t = self.tables.lock();
        if ticket.user_id.is_some_and(|id| !t.users.contains_key(&id))
            || ticket.order_id.is_some_and(|id| !t.orders.contains_key(&id))
        {
            return Err(missing_reference());
        }
        t.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket.clone())
    }

    async fn list_tickets(&self, user_id: Option<Uuid>) -> Result<Vec<SupportTicket>> {
        let tickets = self
            .tables
            .lock()
            .tickets
            .values()
            .filter(|k| user_id.is_none() || k.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(tickets, |k: &SupportTicket| k.created_at))
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<SupportTicket>> {
        Ok(self.tables.lock().tickets.get(&id).cloned())
    }

    async fn update_ticket(&self, ticket: &SupportTicket) -> Result<Option<SupportTicket>> {
        let mut t = self.tables.lock();
        if ticket.assigned_to.is_some_and(|id| !t.users.contains_key(&id)) { return Err(missing_reference()); }
        let Some(stored) = t.tickets.get_mut(&ticket.id) else { return Ok(None) };
        stored.status = ticket.status;
        stored.priority = ticket.priority;
        stored.assigned_to = ticket.assigned_to;
        stored.updated_at = ticket.updated_at;
        stored.resolved_at = ticket.resolved_at;
        Ok(Some(stored.clone()))
    }

    async fn add_message(&self, ticket: &SupportTicket, message: &TicketMessage) -> Result<TicketMessage> {
        let mut t = self.tables.lock();
        if message.user_id.is_some_and(|id| !t.users.contains_key(&id)) { return Err(missing_reference()); }
        let stored = t.tickets.get_mut(&ticket.id).ok_or_else(missing_reference)?;
        stored.status = ticket.status;
        stored.updated_at = ticket.updated_at;
        stored.messages.push(message.clone());
        Ok(message.clone())
    }

    async fn delete_ticket(&self, id: Uuid) -> Result<bool> { Ok(self.tables.lock().tickets.remove(&id).is_some()) }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn claim_pending(&self, limit: i64, stale_before: DateTime<Utc>) -> Result<Vec<OutboxMessage>> {
        let now = Utc::now();
        let mut t = self.tables.lock();
        let limit = usize::try_from(limit).unwrap_or(0);
        let claimable = |m: &&mut OutboxMessage| match m.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Dispatching => m.claimed_at.map_or(true, |at| at <= stale_before),
            OutboxStatus::Sent | OutboxStatus::Failed => false,
        };
        let mut claimed = Vec::new();
        for message in t.outbox.iter_mut().filter(claimable).take(limit) {
            message.status = OutboxStatus::Dispatching;
            message.attempts += 1;
            message.claimed_at = Some(now);
            claimed.push(message.clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        if let Some(message) = self.tables.lock().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Sent;
            message.last_error = None;
            message.dispatched_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        if let Some(message) = self.tables.lock().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Failed;
            message.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxMessage>> {
        Ok(self.tables.lock().outbox.iter().filter(|m| m.order_id == order_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CouponType, Role};
    use rust_decimal::Decimal;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(), email: "buyer@example.com".into(), password_hash: None,
            first_name: None, last_name: None, phone: None, role: Role::Customer,
            created_at: now, updated_at: now,
        }
    }

    fn limited_coupon(limit: i32) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::now_v7(), code: "ONCE".into(), coupon_type: CouponType::Fixed, value: Decimal::new(5, 0),
            min_purchase: None, max_discount: None, expires_at: None, usage_limit: Some(limit),
            usage_count: 0, is_active: true, created_at: now, updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_redeem_stops_at_limit() {
        let store = MemoryStore::default();
        let coupon = CouponRepository::insert(&store, &limited_coupon(2)).await.unwrap();
        assert_eq!(store.redeem(coupon.id).await.unwrap().map(|c| c.usage_count), Some(1));
        assert_eq!(store.redeem(coupon.id).await.unwrap().map(|c| c.usage_count), Some(2));
        assert!(store.redeem(coupon.id).await.unwrap().is_none());
        let stored = CouponRepository::find(&store, coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
    }

    #[tokio::test]
    async fn test_coupon_update_never_moves_usage_count() {
        let store = MemoryStore::default();
        let mut coupon = CouponRepository::insert(&store, &limited_coupon(5)).await.unwrap();
        store.redeem(coupon.id).await.unwrap();
        coupon.is_active = false;
        let updated = CouponRepository::update(&store, &coupon).await.unwrap().unwrap();
        assert_eq!(updated.usage_count, 1);
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn test_coupon_update_keeps_limit_above_usage() {
        let store = MemoryStore::default();
        let mut coupon = CouponRepository::insert(&store, &limited_coupon(5)).await.unwrap();
        store.redeem(coupon.id).await.unwrap();
        store.redeem(coupon.id).await.unwrap();
        coupon.usage_limit = Some(1);
        assert!(matches!(
            CouponRepository::update(&store, &coupon).await,
            Err(CommerceError::BadRequest(_))
        ));
        let stored = CouponRepository::find(&store, coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_limit, Some(5));
    }

    #[tokio::test]
    async fn test_expired_coupon_is_not_redeemed() {
        let store = MemoryStore::default();
        let mut expired = limited_coupon(5);
        expired.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let coupon = CouponRepository::insert(&store, &expired).await.unwrap();
        assert!(store.redeem(coupon.id).await.unwrap().is_none());
        assert_eq!(CouponRepository::find(&store, coupon.id).await.unwrap().unwrap().usage_count, 0);
    }

    #[tokio::test]
    async fn test_stale_order_version_is_refused() {
        let store = MemoryStore::default();
        let (order, placed) = Order::place(crate::domain::aggregates::order::tests::new_order(None), None);
        let stored = OrderRepository::insert(&store, &order, &[placed]).await.unwrap();

        let first = OrderRepository::update(&store, &stored, &[]).await.unwrap().unwrap();
        assert_eq!(first.version, 1);
        assert!(OrderRepository::update(&store, &stored, &[]).await.unwrap().is_none());
        assert_eq!(store.list_for_order(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_hands_out_each_message_once() {
        let store = MemoryStore::default();
        let (order, placed) = Order::place(crate::domain::aggregates::order::tests::new_order(None), None);
        OrderRepository::insert(&store, &order, &[placed]).await.unwrap();

        let lease_start = Utc::now() - chrono::Duration::minutes(5);
        let claimed = store.claim_pending(10, lease_start).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, OutboxStatus::Dispatching);
        assert_eq!(claimed[0].attempts, 1);
        assert!(claimed[0].claimed_at.is_some());
        assert!(store.claim_pending(10, lease_start).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_claim_is_taken_again() {
        let store = MemoryStore::default();
        let (order, placed) = Order::place(crate::domain::aggregates::order::tests::new_order(None), None);
        OrderRepository::insert(&store, &order, &[placed]).await.unwrap();
        let first = store.claim_pending(10, Utc::now() - chrono::Duration::minutes(5)).await.unwrap();

        let again = store.claim_pending(10, Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, first[0].id);
        assert_eq!(again[0].attempts, 2);

        store.mark_sent(first[0].id).await.unwrap();
        assert!(store.claim_pending(10, Utc::now() + chrono::Duration::seconds(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_delete_cascades() {
        let store = MemoryStore::default();
        let (order, placed) = Order::place(crate::domain::aggregates::order::tests::new_order(None), None);
        OrderRepository::insert(&store, &order, &[placed]).await.unwrap();
        let refund = store.insert_refund(&Refund::request(Some(order.id), None, Decimal::new(5, 0), None)).await.unwrap();

        assert!(OrderRepository::delete(&store, order.id).await.unwrap());
        assert!(store.list_for_order(order.id).await.unwrap().is_empty());
        assert_eq!(store.find_refund(refund.id).await.unwrap().unwrap().order_id, None);
        assert!(!OrderRepository::delete(&store, order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cart_requires_existing_user() {
        let store = MemoryStore::default();
        let owner = user();
        assert!(matches!(
            store.save(&Cart::for_user(owner.id)).await,
            Err(CommerceError::BadRequest(_))
        ));
        UserRepository::insert(&store, &owner).await.unwrap();
        let first = store.save(&Cart::for_user(owner.id)).await.unwrap();
        let second = store.save(&Cart::for_user(owner.id)).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_ticket_keeps_thread_and_survives_order_delete() {
        let store = MemoryStore::default();
        let owner = user();
        UserRepository::insert(&store, &owner).await.unwrap();
        let (order, placed) = Order::place(crate::domain::aggregates::order::tests::new_order(None), Some(owner.id));
        OrderRepository::insert(&store, &order, &[placed]).await.unwrap();

        let mut input = crate::domain::aggregates::support::tests::new_ticket();
        input.order_id = Some(order.id);
        let mut ticket = store.insert_ticket(&SupportTicket::open(input, owner.id)).await.unwrap();
        let message = ticket.reply(owner.id, "Where is my parcel?".into(), false);
        store.add_message(&ticket, &message).await.unwrap();

        OrderRepository::delete(&store, order.id).await.unwrap();
        let stored = store.find_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.order_id, None);
        assert_eq!(stored.messages, vec![message]);

        let stray = SupportTicket::open(crate::domain::aggregates::support::tests::new_ticket(), Uuid::now_v7());
        assert!(matches!(store.insert_ticket(&stray).await, Err(CommerceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_shipping_methods_cheapest_first() {
        use crate::domain::aggregates::shipping::tests::new_method;
        let store = MemoryStore::default();
        let express = ShippingMethod::create(new_method("Express", 12)).unwrap();
        let mut hidden = ShippingMethod::create(new_method("Pallet", 1)).unwrap();
        hidden.is_active = false;
        for method in [&express, &hidden, &ShippingMethod::create(new_method("Standard", 5)).unwrap()] {
            ShippingRepository::insert(&store, method).await.unwrap();
        }

        let names = |methods: Vec<ShippingMethod>| methods.into_iter().map(|m| m.name).collect::<Vec<_>>();
        assert_eq!(names(ShippingRepository::list(&store, false).await.unwrap()), ["Standard", "Express"]);
        assert_eq!(names(ShippingRepository::list(&store, true).await.unwrap()), ["Pallet", "Standard", "Express"]);
    }
}
