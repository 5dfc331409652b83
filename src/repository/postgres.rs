//! Postgres adapter.
//!
//! Rows carry enum columns as text and are converted into domain types on the way out. The
//! writes that race (coupon redemption, stock decrement, versioned order updates, outbox
//! claims) are single conditional statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    CartRepository, CouponRepository, OrderRepository, OutboxRepository, Page, PaymentRepository,
    ProductFilter, ProductRepository, ProductSort, ShippingRepository, SupportRepository, UserRepository,
};
use crate::domain::aggregates::{
    Cart, CartItem, Coupon, Order, PaymentTransaction, Product, Refund, ShippingMethod, SupportTicket,
    TicketMessage, User,
};
use crate::domain::events::{OrderEvent, OutboxMessage, OutboxStatus};
use crate::domain::value_objects::CouponCode;
use crate::{CommerceError, Result};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CommerceError;

    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id, email: r.email, password_hash: r.password_hash, first_name: r.first_name,
            last_name: r.last_name, phone: r.phone, role: r.role.parse()?,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    sku: String,
    description: Option<String>,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    stock: i32,
    tags: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = CommerceError;

    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, name: r.name, slug: r.slug, sku: r.sku, description: r.description,
            price: r.price, compare_at_price: r.compare_at_price, stock: r.stock, tags: r.tags,
            status: r.status.parse()?, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    items: Json<Vec<CartItem>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(r: CartRow) -> Self {
        Cart { id: r.id, user_id: r.user_id, items: r.items.0, created_at: r.created_at, updated_at: r.updated_at }
    }
}

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    coupon_type: String,
    value: Decimal,
    min_purchase: Option<Decimal>,
    max_discount: Option<Decimal>,
    expires_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    usage_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = CommerceError;

    fn try_from(r: CouponRow) -> Result<Self> {
        Ok(Coupon {
            id: r.id, code: r.code, coupon_type: r.coupon_type.parse()?, value: r.value,
            min_purchase: r.min_purchase, max_discount: r.max_discount, expires_at: r.expires_at,
            usage_limit: r.usage_limit, usage_count: r.usage_count, is_active: r.is_active,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    items: Value,
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    status: String,
    payment_status: String,
    payment_method: Option<String>,
    shipping_address: Value,
    billing_address: Value,
    tracking_number: Option<String>,
    notes: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CommerceError;

    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Order {
            id: r.id, order_number: r.order_number, user_id: r.user_id, items: r.items,
            subtotal: r.subtotal, discount: r.discount, tax: r.tax, shipping: r.shipping, total: r.total,
            status: r.status.parse()?, payment_status: r.payment_status.parse()?,
            payment_method: r.payment_method, shipping_address: r.shipping_address,
            billing_address: r.billing_address, tracking_number: r.tracking_number, notes: r.notes,
            version: r.version, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    order_id: Uuid,
    transaction_id: String,
    payment_provider: String,
    amount: Decimal,
    currency: String,
    status: String,
    payment_method_details: Option<Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = CommerceError;

    fn try_from(r: TransactionRow) -> Result<Self> {
        Ok(PaymentTransaction {
            id: r.id, order_id: r.order_id, transaction_id: r.transaction_id,
            payment_provider: r.payment_provider, amount: r.amount, currency: r.currency,
            status: r.status.parse()?, payment_method_details: r.payment_method_details,
            error_message: r.error_message, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct RefundRow {
    id: Uuid,
    order_id: Option<Uuid>,
    transaction_id: Option<Uuid>,
    amount: Decimal,
    reason: Option<String>,
    status: String,
    processed_by: Option<Uuid>,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = CommerceError;

    fn try_from(r: RefundRow) -> Result<Self> {
        Ok(Refund {
            id: r.id, order_id: r.order_id, transaction_id: r.transaction_id, amount: r.amount,
            reason: r.reason, status: r.status.parse()?, processed_by: r.processed_by,
            requested_at: r.requested_at, processed_at: r.processed_at,
        })
    }
}

#[derive(FromRow)]
struct ShippingMethodRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price: Decimal,
    estimated_days_min: Option<i32>,
    estimated_days_max: Option<i32>,
    free_shipping_threshold: Option<Decimal>,
    is_active: bool,
    countries: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<ShippingMethodRow> for ShippingMethod {
    fn from(r: ShippingMethodRow) -> Self {
        ShippingMethod {
            id: r.id, name: r.name, description: r.description, price: r.price,
            estimated_days_min: r.estimated_days_min, estimated_days_max: r.estimated_days_max,
            free_shipping_threshold: r.free_shipping_threshold, is_active: r.is_active,
            countries: r.countries, created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: Uuid,
    user_id: Option<Uuid>,
    order_id: Option<Uuid>,
    subject: String,
    description: String,
    status: String,
    priority: String,
    assigned_to: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

/// Messages are attached separately.
impl TryFrom<TicketRow> for SupportTicket {
    type Error = CommerceError;

    fn try_from(r: TicketRow) -> Result<Self> {
        Ok(SupportTicket {
            id: r.id, user_id: r.user_id, order_id: r.order_id, subject: r.subject,
            description: r.description, status: r.status.parse()?, priority: r.priority.parse()?,
            assigned_to: r.assigned_to, created_at: r.created_at, updated_at: r.updated_at,
            resolved_at: r.resolved_at, messages: Vec::new(),
        })
    }
}

#[derive(FromRow)]
struct TicketMessageRow {
    id: Uuid,
    ticket_id: Uuid,
    user_id: Option<Uuid>,
    message: String,
    is_staff_reply: bool,
    created_at: DateTime<Utc>,
}

impl From<TicketMessageRow> for TicketMessage {
    fn from(r: TicketMessageRow) -> Self {
        TicketMessage {
            id: r.id, ticket_id: r.ticket_id, user_id: r.user_id, message: r.message,
            is_staff_reply: r.is_staff_reply, created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct OutboxRow {
    id: Uuid,
    order_id: Uuid,
    event: Json<OrderEvent>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = CommerceError;

    fn try_from(r: OutboxRow) -> Result<Self> {
        Ok(OutboxMessage {
            id: r.id, order_id: r.order_id, event: r.event.0, status: r.status.parse()?,
            attempts: r.attempts, last_error: r.last_error, created_at: r.created_at,
            claimed_at: r.claimed_at, dispatched_at: r.dispatched_at,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = CommerceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn convert_opt<R, T>(row: Option<R>) -> Result<Option<T>>
where
    T: TryFrom<R, Error = CommerceError>,
{
    row.map(T::try_from).transpose()
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> Result<User> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(user.id).bind(&user.email).bind(&user.password_hash).bind(&user.first_name)
        .bind(&user.last_name).bind(&user.phone).bind(user.role.as_str())
        .bind(user.created_at).bind(user.updated_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductRepository for PgStore {
    async fn list(&self, filter: &ProductFilter, page: Page) -> Result<(Vec<Product>, i64)> {
        const WHERE: &str = "WHERE ($1 OR status = 'active') AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%') \
             AND ($3::numeric IS NULL OR price >= $3) AND ($4::numeric IS NULL OR price <= $4)";
        let order = match filter.sort {
            ProductSort::Newest => "created_at DESC",
            ProductSort::PriceAsc => "price ASC, created_at DESC",
            ProductSort::PriceDesc => "price DESC, created_at DESC",
        };
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products {WHERE} ORDER BY {order} LIMIT $5 OFFSET $6"
        ))
        .bind(filter.include_inactive).bind(&filter.search).bind(filter.min_price).bind(filter.max_price)
        .bind(page.limit()).bind(page.offset())
        .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {WHERE}"))
            .bind(filter.include_inactive).bind(&filter.search).bind(filter.min_price).bind(filter.max_price)
            .fetch_one(&self.pool).await?;
        Ok((convert(rows)?, total.0))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1")
            .bind(slug).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn insert(&self, p: &Product) -> Result<Product> {
        sqlx::query_as::<_, ProductRow>(
            "INSERT INTO products (id, name, slug, sku, description, price, compare_at_price, stock, tags, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(p.id).bind(&p.name).bind(&p.slug).bind(&p.sku).bind(&p.description).bind(p.price)
        .bind(p.compare_at_price).bind(p.stock).bind(&p.tags).bind(p.status.as_str())
        .bind(p.created_at).bind(p.updated_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn update(&self, p: &Product) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET name = $2, slug = $3, sku = $4, description = $5, price = $6, \
             compare_at_price = $7, tags = $8, status = $9, updated_at = $10 WHERE id = $1 RETURNING *",
        )
        .bind(p.id).bind(&p.name).bind(&p.slug).bind(&p.sku).bind(&p.description).bind(p.price)
        .bind(p.compare_at_price).bind(&p.tags).bind(p.status.as_str()).bind(p.updated_at)
        .fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_stock(&self, id: Uuid, stock: i32) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id).bind(stock)
        .fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING *",
        )
        .bind(id).bind(quantity)
        .fetch_optional(&self.pool).await?;
        convert_opt(row)
    }
}

// =============================================================================
// Carts
// =============================================================================

#[async_trait]
impl CartRepository for PgStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Cart::from))
    }

    async fn save(&self, cart: &Cart) -> Result<Cart> {
        let row = sqlx::query_as::<_, CartRow>(
            "INSERT INTO carts (id, user_id, items, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at RETURNING *",
        )
        .bind(cart.id).bind(cart.user_id).bind(Json(&cart.items)).bind(cart.created_at).bind(cart.updated_at)
        .fetch_one(&self.pool).await?;
        Ok(row.into())
    }
}

// =============================================================================
// Coupons
// =============================================================================

#[async_trait]
impl CouponRepository for PgStore {
    async fn list(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn insert(&self, c: &Coupon) -> Result<Coupon> {
        sqlx::query_as::<_, CouponRow>(
            "INSERT INTO coupons (id, code, coupon_type, value, min_purchase, max_discount, expires_at, usage_limit, usage_count, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(c.id).bind(&c.code).bind(c.coupon_type.as_str()).bind(c.value).bind(c.min_purchase)
        .bind(c.max_discount).bind(c.expires_at).bind(c.usage_limit).bind(c.usage_count)
        .bind(c.is_active).bind(c.created_at).bind(c.updated_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn update(&self, c: &Coupon) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(
            "UPDATE coupons SET code = $2, coupon_type = $3, value = $4, min_purchase = $5, max_discount = $6, \
             expires_at = $7, usage_limit = $8, is_active = $9, updated_at = $10 WHERE id = $1 RETURNING *",
        )
        .bind(c.id).bind(&c.code).bind(c.coupon_type.as_str()).bind(c.value).bind(c.min_purchase)
        .bind(c.max_discount).bind(c.expires_at).bind(c.usage_limit).bind(c.is_active).bind(c.updated_at)
        .fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn redeem(&self, id: Uuid) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(
            "UPDATE coupons SET usage_count = usage_count + 1, updated_at = NOW() \
             WHERE id = $1 AND is_active AND (usage_limit IS NULL OR usage_count < usage_limit) \
               AND (expires_at IS NULL OR expires_at > NOW()) RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool).await?;
        convert_opt(row)
    }
}

// =============================================================================
// Orders
// =============================================================================

async fn enqueue(tx: &mut Transaction<'_, Postgres>, events: &[OrderEvent]) -> Result<()> {
    for event in events {
        let message = OutboxMessage::new(event.clone());
        sqlx::query(
            "INSERT INTO notification_outbox (id, order_id, event, status, attempts, created_at) VALUES ($1, $2, $3, $4, 0, $5)",
        )
        .bind(message.id).bind(message.order_id).bind(Json(&message.event))
        .bind(message.status.as_str()).bind(message.created_at)
        .execute(&mut **tx).await?;
    }
    Ok(())
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, o: &Order, events: &[OrderEvent]) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (id, order_number, user_id, items, subtotal, discount, tax, shipping, total, status, payment_status, \
             payment_method, shipping_address, billing_address, tracking_number, notes, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) RETURNING *",
        )
        .bind(o.id).bind(&o.order_number).bind(o.user_id).bind(&o.items).bind(o.subtotal).bind(o.discount)
        .bind(o.tax).bind(o.shipping).bind(o.total).bind(o.status.as_str()).bind(o.payment_status.as_str())
        .bind(&o.payment_method).bind(&o.shipping_address).bind(&o.billing_address)
        .bind(&o.tracking_number).bind(&o.notes).bind(o.version).bind(o.created_at).bind(o.updated_at)
        .fetch_one(&mut *tx).await?;
        enqueue(&mut tx, events).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn list(&self, user_id: Option<Uuid>) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_number = $1")
            .bind(order_number).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn update(&self, o: &Order, events: &[OrderEvent]) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET items = $3, subtotal = $4, discount = $5, tax = $6, shipping = $7, total = $8, \
             status = $9, payment_status = $10, payment_method = $11, shipping_address = $12, billing_address = $13, \
             tracking_number = $14, notes = $15, version = version + 1, updated_at = $16 \
             WHERE id = $1 AND version = $2 RETURNING *",
        )
        .bind(o.id).bind(o.version).bind(&o.items).bind(o.subtotal).bind(o.discount).bind(o.tax)
        .bind(o.shipping).bind(o.total).bind(o.status.as_str()).bind(o.payment_status.as_str())
        .bind(&o.payment_method).bind(&o.shipping_address).bind(&o.billing_address)
        .bind(&o.tracking_number).bind(&o.notes).bind(o.updated_at)
        .fetch_optional(&mut *tx).await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        enqueue(&mut tx, events).await?;
        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Payments
// =============================================================================

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_transaction(&self, t: &PaymentTransaction) -> Result<PaymentTransaction> {
        sqlx::query_as::<_, TransactionRow>(
            "INSERT INTO payment_transactions (id, order_id, transaction_id, payment_provider, amount, currency, status, \
             payment_method_details, error_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(t.id).bind(t.order_id).bind(&t.transaction_id).bind(&t.payment_provider).bind(t.amount)
        .bind(&t.currency).bind(t.status.as_str()).bind(&t.payment_method_details).bind(&t.error_message)
        .bind(t.created_at).bind(t.updated_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn transactions_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY created_at DESC",
        )
        .bind(order_id)
        .fetch_all(&self.pool).await?;
        convert(rows)
    }

    async fn find_transaction(&self, transaction_id: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM payment_transactions WHERE transaction_id = $1")
            .bind(transaction_id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn update_transaction(&self, t: &PaymentTransaction) -> Result<PaymentTransaction> {
        sqlx::query_as::<_, TransactionRow>(
            "UPDATE payment_transactions SET status = $2, error_message = $3, updated_at = $4 WHERE id = $1 RETURNING *",
        )
        .bind(t.id).bind(t.status.as_str()).bind(&t.error_message).bind(t.updated_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn insert_refund(&self, r: &Refund) -> Result<Refund> {
        sqlx::query_as::<_, RefundRow>(
            "INSERT INTO refunds (id, order_id, transaction_id, amount, reason, status, processed_by, requested_at, processed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(r.id).bind(r.order_id).bind(r.transaction_id).bind(r.amount).bind(&r.reason)
        .bind(r.status.as_str()).bind(r.processed_by).bind(r.requested_at).bind(r.processed_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn find_refund(&self, id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query_as::<_, RefundRow>("SELECT * FROM refunds WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        convert_opt(row)
    }

    async fn update_refund(&self, r: &Refund) -> Result<Refund> {
        sqlx::query_as::<_, RefundRow>(
            "UPDATE refunds SET status = $2, processed_by = $3, processed_at = $4 WHERE id = $1 RETURNING *",
        )
        .bind(r.id).bind(r.status.as_str()).bind(r.processed_by).bind(r.processed_at)
        .fetch_one(&self.pool).await?
        .try_into()
    }

    async fn list_refunds(&self) -> Result<Vec<Refund>> {
        let rows = sqlx::query_as::<_, RefundRow>("SELECT * FROM refunds ORDER BY requested_at DESC")
            .fetch_all(&self.pool).await?;
        convert(rows)
    }
}

// =============================================================================
// Shipping
// =============================================================================

#[async_trait]
impl ShippingRepository for PgStore {
    async fn list(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>> {
        let rows = sqlx::query_as::<_, ShippingMethodRow>(
            "SELECT * FROM shipping_methods WHERE $1 OR is_active ORDER BY price ASC, created_at ASC",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ShippingMethod::from).collect())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ShippingMethod>> {
        let row = sqlx::query_as::<_, ShippingMethodRow>("SELECT * FROM shipping_methods WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(ShippingMethod::from))
    }

    async fn insert(&self, m: &ShippingMethod) -> Result<ShippingMethod> {
        let row = sqlx::query_as::<_, ShippingMethodRow>(
            "INSERT INTO shipping_methods (id, name, description, price, estimated_days_min, estimated_days_max, \
             free_shipping_threshold, is_active, countries, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(m.id).bind(&m.name).bind(&m.description).bind(m.price).bind(m.estimated_days_min)
        .bind(m.estimated_days_max).bind(m.free_shipping_threshold).bind(m.is_active).bind(&m.countries)
        .bind(m.created_at)
        .fetch_one(&self.pool).await?;
        Ok(row.into())
    }

    async fn update(&self, m: &ShippingMethod) -> Result<Option<ShippingMethod>> {
        let row = sqlx::query_as::<_, ShippingMethodRow>(
            "UPDATE shipping_methods SET name = $2, description = $3, price = $4, estimated_days_min = $5, \
             estimated_days_max = $6, free_shipping_threshold = $7, is_active = $8, countries = $9 \
             WHERE id = $1 RETURNING *",
        )
        .bind(m.id).bind(&m.name).bind(&m.description).bind(m.price).bind(m.estimated_days_min)
        .bind(m.estimated_days_max).bind(m.free_shipping_threshold).bind(m.is_active).bind(&m.countries)
        .fetch_optional(&self.pool).await?;
        Ok(row.map(ShippingMethod::from))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shipping_methods WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Support
// =============================================================================

impl PgStore {
    async fn with_messages(&self, rows: Vec<TicketRow>) -> Result<Vec<SupportTicket>> {
        let mut tickets: Vec<SupportTicket> = convert(rows)?;
        if tickets.is_empty() { return Ok(tickets); }
        let ids: Vec<Uuid> = tickets.iter().map(|k| k.id).collect();
        let messages = sqlx::query_as::<_, TicketMessageRow>(
            "SELECT * FROM ticket_messages WHERE ticket_id = ANY($1) ORDER BY created_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool).await?;
        let mut threads: HashMap<Uuid, Vec<TicketMessage>> = HashMap::new();
        for row in messages {
            threads.entry(row.ticket_id).or_default().push(row.into());
        }
        for ticket in &mut tickets {
            ticket.messages = threads.remove(&ticket.id).unwrap_or_default();
        }
        Ok(tickets)
    }
}

#[async_trait]
impl SupportRepository for PgStore {
    async fn insert_ticket(&self, k: &SupportTicket) -> Result<SupportTicket> {
        let row = sqlx::query_as::<_, TicketRow>(
            "INSERT INTO support_tickets (id, user_id, order_id, subject, description, status, priority, assigned_to, \
             created_at, updated_at, resolved_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(k.id).bind(k.user_id).bind(k.order_id).bind(&k.subject).bind(&k.description)
        .bind(k.status.as_str()).bind(k.priority.as_str()).bind(k.assigned_to)
        .bind(k.created_at).bind(k.updated_at).bind(k.resolved_at)
        .fetch_one(&self.pool).await?;
        row.try_into()
    }

    async fn list_tickets(&self, user_id: Option<Uuid>) -> Result<Vec<SupportTicket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            "SELECT * FROM support_tickets WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool).await?;
        self.with_messages(rows).await
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<SupportTicket>> {
        let row = sqlx::query_as::<_, TicketRow>("SELECT * FROM support_tickets WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        let Some(row) = row else { return Ok(None) };
        Ok(self.with_messages(vec![row]).await?.pop())
    }

    async fn update_ticket(&self, k: &SupportTicket) -> Result<Option<SupportTicket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            "UPDATE support_tickets SET status = $2, priority = $3, assigned_to = $4, updated_at = $5, resolved_at = $6 \
             WHERE id = $1 RETURNING *",
        )
        .bind(k.id).bind(k.status.as_str()).bind(k.priority.as_str()).bind(k.assigned_to)
        .bind(k.updated_at).bind(k.resolved_at)
        .fetch_optional(&self.pool).await?;
        let Some(row) = row else { return Ok(None) };
        Ok(self.with_messages(vec![row]).await?.pop())
    }

    async fn add_message(&self, k: &SupportTicket, m: &TicketMessage) -> Result<TicketMessage> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE support_tickets SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(k.id).bind(k.status.as_str()).bind(k.updated_at)
            .execute(&mut *tx).await?;
        let row = sqlx::query_as::<_, TicketMessageRow>(
            "INSERT INTO ticket_messages (id, ticket_id, user_id, message, is_staff_reply, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(m.id).bind(m.ticket_id).bind(m.user_id).bind(&m.message).bind(m.is_staff_reply).bind(m.created_at)
        .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete_ticket(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM support_tickets WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Outbox
// =============================================================================

#[async_trait]
impl OutboxRepository for PgStore {
    async fn claim_pending(&self, limit: i64, stale_before: DateTime<Utc>) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "UPDATE notification_outbox SET status = $2, attempts = attempts + 1, claimed_at = NOW() \
             WHERE id IN (SELECT id FROM notification_outbox \
                 WHERE status = $3 OR (status = $2 AND (claimed_at IS NULL OR claimed_at <= $4)) \
                 ORDER BY created_at LIMIT $1 FOR UPDATE SKIP LOCKED) \
             RETURNING *",
        )
        .bind(limit).bind(OutboxStatus::Dispatching.as_str()).bind(OutboxStatus::Pending.as_str()).bind(stale_before)
        .fetch_all(&self.pool).await?;
        let mut messages: Vec<OutboxMessage> = convert(rows)?;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notification_outbox SET status = $2, last_error = NULL, dispatched_at = NOW() WHERE id = $1")
            .bind(id).bind(OutboxStatus::Sent.as_str())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE notification_outbox SET status = $2, last_error = $3 WHERE id = $1")
            .bind(id).bind(OutboxStatus::Failed.as_str()).bind(error)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT * FROM notification_outbox WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool).await?;
        convert(rows)
    }
}
