//! Domain model for the textbook marketplace order core.
//!
//! This crate holds the persistent record types (books, orders, payments,
//! refunds), the order status state machine, and the deterministic per-seller
//! split computation. It is pure data and rules: all I/O lives in the
//! `ledger` and `fulfillment` crates.

pub mod address;
pub mod book;
pub mod cart;
pub mod order;
pub mod payment;
pub mod split;
pub mod status;

pub use address::{Parcel, ShippingAddress};
pub use book::Book;
pub use cart::CartItem;
pub use order::{Order, OrderItem};
pub use payment::{PaymentStatus, PaymentTransaction, Refund, RefundReason, RefundStatus};
pub use split::{SellerSplit, compute_splits};
pub use status::OrderStatus;

use chrono::Duration;

/// How long a seller has to commit to a new order.
pub fn commit_deadline() -> Duration {
    Duration::hours(48)
}

/// Age after which an uncommitted order earns one reminder email.
pub fn reminder_after() -> Duration {
    Duration::hours(24)
}

/// Advisory delay before a delivery-completion check after collection.
pub fn delivery_check_after() -> Duration {
    Duration::days(5)
}
