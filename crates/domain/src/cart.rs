//! Checkout cart lines.

use serde::{Deserialize, Serialize};

use common::{BookId, Money, UserId};

/// One line of a checkout cart, as assembled by the (external) API layer.
///
/// Carries the seller's email so the orchestration core can notify sellers
/// without reaching into the excluded profile store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub book_id: BookId,
    pub seller_id: UserId,
    pub seller_email: String,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(
        book_id: BookId,
        seller_id: UserId,
        seller_email: impl Into<String>,
        title: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            book_id,
            seller_id,
            seller_email: seller_email.into(),
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
