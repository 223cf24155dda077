//! The `Ledger` trait and conditional-update types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{BookId, OrderId, UserId};
use domain::{Book, Order, OrderStatus, PaymentTransaction, Refund};

use crate::error::Result;

/// Fields applied together with a status transition.
///
/// Only the fields relevant to the target status are set; everything else
/// is left untouched. Constructors exist for each transition so call sites
/// cannot mix, say, courier fields into a decline.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub clear_expires_at: bool,
    pub courier_provider: Option<String>,
    pub courier_tracking_number: Option<String>,
    pub shipping_label_url: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub collected_by: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

impl OrderUpdate {
    /// No extra fields; the transition changes status only.
    pub fn none() -> Self {
        Self::default()
    }

    /// Fields for the commit transition: the deadline is cleared.
    pub fn committed() -> Self {
        Self {
            clear_expires_at: true,
            ..Self::default()
        }
    }

    /// Fields for a successful courier booking.
    pub fn courier_scheduled(
        provider: impl Into<String>,
        tracking_number: impl Into<String>,
        label_url: Option<String>,
    ) -> Self {
        Self {
            courier_provider: Some(provider.into()),
            courier_tracking_number: Some(tracking_number.into()),
            shipping_label_url: label_url,
            ..Self::default()
        }
    }

    /// Fields for the collect transition.
    pub fn collected(
        at: DateTime<Utc>,
        by: impl Into<String>,
        tracking_number: Option<String>,
    ) -> Self {
        Self {
            collected_at: Some(at),
            collected_by: Some(by.into()),
            courier_tracking_number: tracking_number,
            ..Self::default()
        }
    }

    /// Fields for the deliver transition.
    pub fn delivered(at: DateTime<Utc>) -> Self {
        Self {
            delivered_at: Some(at),
            ..Self::default()
        }
    }

    /// Fields for the decline/expire compensation transitions.
    pub fn declined(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            clear_expires_at: true,
            declined_at: Some(at),
            decline_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Applies this update to an order record in place.
    pub fn apply(&self, order: &mut Order) {
        if self.clear_expires_at {
            order.expires_at = None;
        }
        if let Some(v) = &self.courier_provider {
            order.courier_provider = Some(v.clone());
        }
        if let Some(v) = &self.courier_tracking_number {
            order.courier_tracking_number = Some(v.clone());
        }
        if let Some(v) = &self.shipping_label_url {
            order.shipping_label_url = Some(v.clone());
        }
        if let Some(v) = self.collected_at {
            order.collected_at = Some(v);
        }
        if let Some(v) = &self.collected_by {
            order.collected_by = Some(v.clone());
        }
        if let Some(v) = self.delivered_at {
            order.delivered_at = Some(v);
        }
        if let Some(v) = self.declined_at {
            order.declined_at = Some(v);
        }
        if let Some(v) = &self.decline_reason {
            order.decline_reason = Some(v.clone());
        }
    }
}

/// Transactional persistence for orders, books, payments, and refunds.
///
/// The availability and status mutations are conditional: they apply only
/// if the stored record still matches the caller's precondition, and report
/// a conflict otherwise. Implementations must make each method atomic.
#[async_trait]
pub trait Ledger: Send + Sync {
    // --- Books ---

    /// Inserts a book listing.
    async fn insert_book(&self, book: Book) -> Result<()>;

    /// Fetches a book by ID.
    async fn get_book(&self, id: BookId) -> Result<Option<Book>>;

    /// Conditionally marks all given books sold for `buyer`.
    ///
    /// All-or-nothing: if any book is already sold or actively reserved by
    /// another buyer, nothing changes and `BooksUnavailable` lists the
    /// losers. This is the hard mutual-exclusion point of the system.
    async fn reserve_books(
        &self,
        ids: &[BookId],
        buyer: UserId,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Releases books back to availability (`sold = false`, reservation
    /// fields cleared). Used by the decline/expire compensation path.
    async fn release_books(&self, ids: &[BookId]) -> Result<()>;

    // --- Orders ---

    /// Inserts a batch of sibling orders atomically.
    async fn insert_orders(&self, orders: &[Order]) -> Result<()>;

    /// Fetches an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Fetches all sibling orders sharing a payment reference.
    async fn orders_for_payment(&self, reference: &str) -> Result<Vec<Order>>;

    /// Conditionally transitions an order's status.
    ///
    /// Applies `new` status and `update` only if the current status equals
    /// `expected`; otherwise returns `StatusConflict` with the actual
    /// status and nothing changes. Returns the updated record.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        update: OrderUpdate,
    ) -> Result<Order>;

    /// Pending-commit orders whose deadline has passed at `now`.
    async fn overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Pending-commit orders created before `created_before`, not yet
    /// overdue at `now`, with no reminder sent.
    async fn reminder_due_orders(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>>;

    /// Stamps `reminder_sent_at` if the order is still pending and
    /// unstamped. Returns true if this call did the stamping, so reminders
    /// are at-most-once even across concurrent sweeps.
    async fn stamp_reminder_sent(&self, id: OrderId, at: DateTime<Utc>) -> Result<bool>;

    // --- Payments & refunds ---

    /// Records a payment transaction keyed by reference, only if no
    /// transaction with that reference exists yet. Returns true if this
    /// call recorded it, so concurrent checkouts sharing a reference
    /// resolve to exactly one owner.
    async fn claim_payment(&self, tx: PaymentTransaction) -> Result<bool>;

    /// Removes a payment claim so its reference can be retried after an
    /// aborted checkout.
    async fn release_payment(&self, reference: &str) -> Result<()>;

    /// Fetches a payment transaction by reference.
    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentTransaction>>;

    /// Appends a refund record.
    async fn insert_refund(&self, refund: Refund) -> Result<()>;

    /// All refund records for an order, oldest first.
    async fn refunds_for_order(&self, id: OrderId) -> Result<Vec<Refund>>;
}
