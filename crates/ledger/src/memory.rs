use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{BookId, OrderId, UserId};
use domain::{Book, Order, OrderStatus, PaymentTransaction, Refund};

use crate::error::{LedgerError, Result};
use crate::store::{Ledger, OrderUpdate};

#[derive(Default)]
struct State {
    books: HashMap<BookId, Book>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<String, PaymentTransaction>,
    refunds: Vec<Refund>,
    fail_on_release: bool,
}

/// In-memory ledger implementation for tests and local wiring.
///
/// A single `RwLock` over the whole state makes every method atomic,
/// matching the transactional guarantees of the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<State>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of refund records stored.
    pub async fn refund_count(&self) -> usize {
        self.state.read().await.refunds.len()
    }

    /// Rewrites an order's commitment deadline. Lets tests backdate an
    /// order into overdue territory without waiting out the real window.
    pub async fn set_expires_at(&self, id: OrderId, at: DateTime<Utc>) {
        if let Some(order) = self.state.write().await.orders.get_mut(&id) {
            order.expires_at = Some(at);
        }
    }

    /// Rewrites an order's creation time. Lets tests age an order into
    /// the reminder window.
    pub async fn set_created_at(&self, id: OrderId, at: DateTime<Utc>) {
        if let Some(order) = self.state.write().await.orders.get_mut(&id) {
            order.created_at = at;
        }
    }

    /// Makes subsequent `release_books` calls fail with a database error.
    pub async fn set_fail_on_release(&self, fail: bool) {
        self.state.write().await.fail_on_release = fail;
    }

    /// Clears all stored records.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.books.clear();
        state.orders.clear();
        state.payments.clear();
        state.refunds.clear();
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn insert_book(&self, book: Book) -> Result<()> {
        self.state.write().await.books.insert(book.id, book);
        Ok(())
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>> {
        Ok(self.state.read().await.books.get(&id).cloned())
    }

    async fn reserve_books(
        &self,
        ids: &[BookId],
        buyer: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        // Check everything first so a failure leaves no partial state.
        let unavailable: Vec<BookId> = ids
            .iter()
            .filter(|id| {
                !state
                    .books
                    .get(id)
                    .is_some_and(|b| b.is_sellable(buyer, now))
            })
            .copied()
            .collect();

        if !unavailable.is_empty() {
            return Err(LedgerError::BooksUnavailable(unavailable));
        }

        for id in ids {
            if let Some(book) = state.books.get_mut(id) {
                book.sold = true;
                book.reserved_until = None;
                book.reserved_by = None;
            }
        }
        Ok(())
    }

    async fn release_books(&self, ids: &[BookId]) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_release {
            return Err(LedgerError::Database(sqlx::Error::PoolClosed));
        }
        for id in ids {
            if let Some(book) = state.books.get_mut(id) {
                book.sold = false;
                book.reserved_until = None;
                book.reserved_by = None;
            }
        }
        Ok(())
    }

    async fn insert_orders(&self, orders: &[Order]) -> Result<()> {
        let mut state = self.state.write().await;
        for order in orders {
            state.orders.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_payment(&self, reference: &str) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.payment_reference == reference)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        update: OrderUpdate,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(LedgerError::OrderNotFound(id))?;

        if order.status != expected {
            return Err(LedgerError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        order.status = new;
        update.apply(order);
        Ok(order.clone())
    }

    async fn overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.is_overdue(now))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.expires_at);
        Ok(orders)
    }

    async fn reminder_due_orders(
        &self,
        created_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::PendingCommit
                    && o.created_at < created_before
                    && o.expires_at.is_some_and(|at| at > now)
                    && o.reminder_sent_at.is_none()
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn stamp_reminder_sent(&self, id: OrderId, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(LedgerError::OrderNotFound(id))?;

        if order.status != OrderStatus::PendingCommit || order.reminder_sent_at.is_some() {
            return Ok(false);
        }
        order.reminder_sent_at = Some(at);
        Ok(true)
    }

    async fn claim_payment(&self, tx: PaymentTransaction) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&tx.reference) {
            return Ok(false);
        }
        state.payments.insert(tx.reference.clone(), tx);
        Ok(true)
    }

    async fn release_payment(&self, reference: &str) -> Result<()> {
        self.state.write().await.payments.remove(reference);
        Ok(())
    }

    async fn get_payment(&self, reference: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.read().await.payments.get(reference).cloned())
    }

    async fn insert_refund(&self, refund: Refund) -> Result<()> {
        self.state.write().await.refunds.push(refund);
        Ok(())
    }

    async fn refunds_for_order(&self, id: OrderId) -> Result<Vec<Refund>> {
        let state = self.state.read().await;
        Ok(state
            .refunds
            .iter()
            .filter(|r| r.order_id == id)
            .cloned()
            .collect())
    }
}
