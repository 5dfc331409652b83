//! Application services. Handlers call these; these call the repositories.

pub mod auth;
pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod support;

use uuid::Uuid;

use crate::config::Config;
use crate::repository::Repositories;

pub use auth::AuthService;
pub use carts::CartService;
pub use catalog::CatalogService;
pub use coupons::CouponService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use shipping::ShippingService;
pub use support::SupportService;

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub shipping: ShippingService,
    pub support: SupportService,
}

impl Services {
    pub fn new(repos: &Repositories, config: &Config) -> Self {
        Self {
            auth: AuthService::new(
                repos.users.clone(),
                &config.jwt_secret,
                config.jwt_ttl_hours,
                config.admin_emails.clone(),
            ),
            catalog: CatalogService::new(repos.products.clone()),
            carts: CartService::new(repos.carts.clone()),
            coupons: CouponService::new(repos.coupons.clone()),
            orders: OrderService::new(repos.orders.clone()),
            payments: PaymentService::new(repos.payments.clone()),
            shipping: ShippingService::new(repos.shipping.clone()),
            support: SupportService::new(repos.support.clone()),
        }
    }
}
