//! Book inventory records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{BookId, Money, UserId};

/// One physical book listed for sale.
///
/// The `sold`/`reserved_*` fields are the system's principal contended
/// resource; they are only ever mutated through conditional updates in the
/// ledger, never read-then-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub seller_id: UserId,
    pub title: String,
    pub price: Money,
    pub sold: bool,
    pub reserved_until: Option<DateTime<Utc>>,
    pub reserved_by: Option<UserId>,
}

impl Book {
    /// Creates a new unsold, unreserved listing.
    pub fn new(seller_id: UserId, title: impl Into<String>, price: Money) -> Self {
        Self {
            id: BookId::new(),
            seller_id,
            title: title.into(),
            price,
            sold: false,
            reserved_until: None,
            reserved_by: None,
        }
    }

    /// Returns true if this book may be bought by `buyer` at `now`.
    ///
    /// A book is sellable iff it is unsold and any reservation has lapsed or
    /// is held by the same buyer.
    pub fn is_sellable(&self, buyer: UserId, now: DateTime<Utc>) -> bool {
        if self.sold {
            return false;
        }
        match (self.reserved_until, self.reserved_by) {
            (Some(until), Some(holder)) => until <= now || holder == buyer,
            (Some(until), None) => until <= now,
            _ => true,
        }
    }
}
