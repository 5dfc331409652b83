//! JSON API over axum.

pub mod auth;
pub mod carts;
pub mod coupons;
pub mod error;
pub mod extract;
pub mod orders;
pub mod payments;
pub mod products;
pub mod shipping;
pub mod support;

use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self { Self { services } }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront"}))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::profile))
        .route("/products", get(products::list).post(products::create))
        .route("/products/slug/:slug", get(products::by_slug))
        .route("/products/:id", get(products::get).patch(products::update).delete(products::remove))
        .route("/products/:id/stock", patch(products::set_stock))
        .route("/products/:id/decrement-stock", post(products::decrement_stock))
        .route("/carts", get(carts::get).post(carts::replace_items).delete(carts::clear))
        .route("/carts/items", post(carts::add_item))
        .route("/carts/items/:product_id", patch(carts::update_quantity).delete(carts::remove_item))
        .route("/coupons", get(coupons::list).post(coupons::create))
        .route("/coupons/code/:code", get(coupons::by_code))
        .route("/coupons/validate/:code", get(coupons::validate))
        .route("/coupons/apply/:code", post(coupons::apply))
        .route("/coupons/:id", get(coupons::get).patch(coupons::update).delete(coupons::remove))
        .route("/orders", get(orders::list).post(orders::create))
        .route("/orders/number/:number", get(orders::by_number))
        .route("/orders/:id", get(orders::get).patch(orders::update).delete(orders::remove))
        .route("/orders/:id/status", patch(orders::update_status))
        .route("/orders/:id/payment-status", patch(orders::update_payment_status))
        .route("/orders/:id/validate-payment", patch(orders::validate_payment))
        .route("/payments/transactions", post(payments::create_transaction))
        .route("/payments/transactions/order/:order_id", get(payments::transactions_for_order))
        .route("/payments/transactions/:transaction_id/status", patch(payments::update_transaction_status))
        .route("/payments/refunds", get(payments::list_refunds).post(payments::request_refund))
        .route("/payments/refunds/:id/process", patch(payments::process_refund))
        .route("/shipping", get(shipping::list).post(shipping::create))
        .route("/shipping/admin", get(shipping::list_all))
        .route("/shipping/calculate", get(shipping::calculate))
        .route("/shipping/:id", get(shipping::get).patch(shipping::update).delete(shipping::remove))
        .route("/support/tickets", get(support::list).post(support::create))
        .route("/support/tickets/:id", get(support::get).patch(support::update).delete(support::remove))
        .route("/support/tickets/:id/messages", post(support::add_message));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}
