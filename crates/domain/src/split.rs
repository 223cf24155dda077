//! Deterministic per-seller split computation.
//!
//! Splits are derived from the cart (or an order's items) every time they
//! are needed and never persisted, so the stored orders and the fee
//! arithmetic can never drift apart.

use common::{Money, UserId};

use crate::cart::CartItem;
use crate::order::OrderItem;

/// Platform commission in percent of each seller's subtotal.
pub const PLATFORM_FEE_PERCENT: i64 = 10;

/// One seller's share of a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct SellerSplit {
    pub seller_id: UserId,
    pub seller_email: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub platform_fee: Money,
    pub seller_amount: Money,
}

/// Groups cart items by seller, preserving first-appearance order, and
/// computes each seller's subtotal and fee split.
///
/// Fee arithmetic stays in integer cents: the fee is truncated and the
/// seller amount is the exact remainder, so `platform_fee + seller_amount`
/// always equals the subtotal.
pub fn compute_splits(items: &[CartItem]) -> Vec<SellerSplit> {
    let mut splits: Vec<SellerSplit> = Vec::new();

    for item in items {
        let order_item = OrderItem::new(item.book_id, item.title.clone(), item.price, item.quantity);
        match splits.iter_mut().find(|s| s.seller_id == item.seller_id) {
            Some(split) => {
                split.subtotal += order_item.line_total();
                split.items.push(order_item);
            }
            None => splits.push(SellerSplit {
                seller_id: item.seller_id,
                seller_email: item.seller_email.clone(),
                items: vec![order_item.clone()],
                subtotal: order_item.line_total(),
                platform_fee: Money::zero(),
                seller_amount: Money::zero(),
            }),
        }
    }

    for split in &mut splits {
        split.platform_fee = split.subtotal.percent(PLATFORM_FEE_PERCENT);
        split.seller_amount = split.subtotal - split.platform_fee;
    }

    splits
}
