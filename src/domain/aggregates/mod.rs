//! Aggregates module

pub mod cart;
pub mod coupon;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;
pub mod support;
pub mod user;

pub use cart::{Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponError, CouponType};
pub use order::{Order, OrderError, OrderStatus, PaymentStatus, CASH_ON_DELIVERY};
pub use payment::{PaymentError, PaymentTransaction, Refund, RefundStatus, TransactionStatus};
pub use product::{Product, ProductError, ProductStatus};
pub use shipping::{ShippingError, ShippingMethod};
pub use support::{SupportTicket, TicketMessage, TicketPriority, TicketStatus};
pub use user::{Role, User};
