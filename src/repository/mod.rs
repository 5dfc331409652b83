//! Persistence ports and their adapters.
//!
//! Services depend only on the traits below. [`postgres`] backs them with sqlx; [`memory`]
//! keeps everything in process and is selected when no database is configured.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Coupon, Order, PaymentTransaction, Product, Refund, ShippingMethod, SupportTicket, TicketMessage, User,
};
use crate::domain::events::{OrderEvent, OutboxMessage};
use crate::domain::value_objects::CouponCode;
use crate::Result;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub include_inactive: bool,
    /// Inclusive price bounds.
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: ProductSort,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<User>;
    async fn find(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list(&self, filter: &ProductFilter, page: Page) -> Result<(Vec<Product>, i64)>;
    async fn find(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    async fn insert(&self, product: &Product) -> Result<Product>;
    async fn update(&self, product: &Product) -> Result<Option<Product>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn set_stock(&self, id: Uuid, stock: i32) -> Result<Option<Product>>;
    /// Takes `quantity` off the stock only if that much remains. `None` when the product is
    /// missing or short.
    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<Product>>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>>;
    /// Upsert keyed by `user_id`.
    async fn save(&self, cart: &Cart) -> Result<Cart>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Coupon>>;
    async fn find(&self, id: Uuid) -> Result<Option<Coupon>>;
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>>;
    async fn insert(&self, coupon: &Coupon) -> Result<Coupon>;
    /// Writes every field except `usage_count`, which only [`CouponRepository::redeem`] moves.
    async fn update(&self, coupon: &Coupon) -> Result<Option<Coupon>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    /// Increments `usage_count` in a single conditional write: the coupon must still be active,
    /// unexpired and under its usage limit. `None` when no row qualified.
    async fn redeem(&self, id: Uuid) -> Result<Option<Coupon>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores the order and queues `events` in the outbox in the same write.
    async fn insert(&self, order: &Order, events: &[OrderEvent]) -> Result<Order>;
    /// Newest first; `user_id` restricts to one customer's orders.
    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Order>>;
    async fn find(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>>;
    /// Writes the order only if the stored version still equals `order.version`, bumping the
    /// version and queueing `events` in the same write. `None` on a stale version or a
    /// missing row.
    async fn update(&self, order: &Order, events: &[OrderEvent]) -> Result<Option<Order>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction>;
    async fn transactions_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>>;
    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn update_transaction(&self, transaction: &PaymentTransaction) -> Result<PaymentTransaction>;
    async fn insert_refund(&self, refund: &Refund) -> Result<Refund>;
    async fn find_refund(&self, id: Uuid) -> Result<Option<Refund>>;
    async fn update_refund(&self, refund: &Refund) -> Result<Refund>;
    async fn list_refunds(&self) -> Result<Vec<Refund>>;
}

#[async_trait]
pub trait ShippingRepository: Send + Sync {
    /// Cheapest first.
    async fn list(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>>;
    async fn find(&self, id: Uuid) -> Result<Option<ShippingMethod>>;
    async fn insert(&self, method: &ShippingMethod) -> Result<ShippingMethod>;
    async fn update(&self, method: &ShippingMethod) -> Result<Option<ShippingMethod>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Tickets are always returned with their messages, oldest message first.
#[async_trait]
pub trait SupportRepository: Send + Sync {
    async fn insert_ticket(&self, ticket: &SupportTicket) -> Result<SupportTicket>;
    /// Newest first; `user_id` restricts to one customer's tickets.
    async fn list_tickets(&self, user_id: Option<Uuid>) -> Result<Vec<SupportTicket>>;
    async fn find_ticket(&self, id: Uuid) -> Result<Option<SupportTicket>>;
    /// Writes status, priority, assignee and the timestamps.
    async fn update_ticket(&self, ticket: &SupportTicket) -> Result<Option<SupportTicket>>;
    /// Stores `message` together with the ticket status it produced.
    async fn add_message(&self, ticket: &SupportTicket, message: &TicketMessage) -> Result<TicketMessage>;
    async fn delete_ticket(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Moves up to `limit` messages to `dispatching` and returns them oldest first. Takes
    /// `pending` messages and `dispatching` ones claimed at or before `stale_before`.
    /// A live claim is held by one claimant only.
    async fn claim_pending(&self, limit: i64, stale_before: DateTime<Utc>) -> Result<Vec<OutboxMessage>>;
    async fn mark_sent(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxMessage>>;
}

/// Every repository the services need, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub shipping: Arc<dyn ShippingRepository>,
    pub support: Arc<dyn SupportRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            products: store.clone(),
            carts: store.clone(),
            coupons: store.clone(),
            orders: store.clone(),
            payments: store.clone(),
            shipping: store.clone(),
            support: store.clone(),
            outbox: store,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            users: store.clone(),
            products: store.clone(),
            carts: store.clone(),
            coupons: store.clone(),
            orders: store.clone(),
            payments: store.clone(),
            shipping: store.clone(),
            support: store.clone(),
            outbox: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let page = Page::new(Some(0), Some(500));
        assert_eq!(page, Page { page: 1, per_page: MAX_PER_PAGE });
        let page = Page::new(Some(3), None);
        assert_eq!(page.limit(), 20);
        assert_eq!(page.offset(), 40);
    }
}
