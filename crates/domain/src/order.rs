//! Order records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{BookId, Money, OrderId, UserId};

use crate::address::ShippingAddress;
use crate::status::OrderStatus;

/// One item line within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub book_id: BookId,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn new(book_id: BookId, title: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            book_id,
            title: title.into(),
            price,
            quantity,
        }
    }

    /// Line total (price x quantity).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A per-seller order.
///
/// Multi-seller checkouts create one `Order` per seller; siblings share the
/// `payment_reference`. `expires_at` is set only while the status is
/// `pending_commit` and cleared on the commit transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub buyer_email: String,
    pub seller_id: UserId,
    pub seller_email: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub payment_reference: String,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub collected_by: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub courier_provider: Option<String>,
    pub courier_tracking_number: Option<String>,
    pub shipping_label_url: Option<String>,
}

impl Order {
    /// Creates a fresh pending order for one seller's share of a checkout.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        buyer_id: UserId,
        buyer_email: impl Into<String>,
        seller_id: UserId,
        seller_email: impl Into<String>,
        items: Vec<OrderItem>,
        total_amount: Money,
        payment_reference: impl Into<String>,
        shipping_address: ShippingAddress,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            buyer_id,
            buyer_email: buyer_email.into(),
            seller_id,
            seller_email: seller_email.into(),
            status: OrderStatus::PendingCommit,
            items,
            total_amount,
            payment_reference: payment_reference.into(),
            shipping_address,
            created_at,
            expires_at: Some(expires_at),
            reminder_sent_at: None,
            collected_at: None,
            collected_by: None,
            delivered_at: None,
            declined_at: None,
            decline_reason: None,
            courier_provider: None,
            courier_tracking_number: None,
            shipping_label_url: None,
        }
    }

    /// Book IDs covered by this order (this seller's books only).
    pub fn book_ids(&self) -> Vec<BookId> {
        self.items.iter().map(|i| i.book_id).collect()
    }

    /// Returns true if the commitment deadline has passed at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::PendingCommit
            && self.expires_at.is_some_and(|at| at < now)
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
