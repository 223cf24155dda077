//! Ledger store for the textbook marketplace.
//!
//! Persistence for orders, book inventory, payment transactions, and
//! refunds. Every order status transition and every book availability
//! mutation goes through a conditional update: callers state the expected
//! current value and the store either applies the change atomically or
//! reports a conflict. This compare-and-swap discipline is what lets the
//! deadline sweeper, reminder sweep, and seller actions run concurrently
//! without double-selling a book or refunding an order twice.
//!
//! Two implementations are provided: [`InMemoryLedger`] for tests and the
//! worker's default wiring, and [`PostgresLedger`] backed by sqlx.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use store::{Ledger, OrderUpdate};
