use thiserror::Error;

use common::{BookId, OrderId};
use domain::OrderStatus;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A conditional status update found a different current status.
    /// The caller must not proceed with dependent side effects.
    #[error(
        "Status conflict for order {order_id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A conditional batch reservation found books no longer available.
    /// Nothing was reserved.
    #[error("Books not available: {}", format_ids(.0))]
    BooksUnavailable(Vec<BookId>),

    /// The order was not found in the store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_ids(ids: &[BookId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn books_unavailable_lists_ids() {
        let ids = vec![BookId::new(), BookId::new()];
        let msg = LedgerError::BooksUnavailable(ids.clone()).to_string();
        assert!(msg.contains(&ids[0].to_string()));
        assert!(msg.contains(&ids[1].to_string()));
    }

    #[test]
    fn status_conflict_names_both_statuses() {
        let err = LedgerError::StatusConflict {
            order_id: OrderId::new(),
            expected: OrderStatus::PendingCommit,
            actual: OrderStatus::Expired,
        };
        let msg = err.to_string();
        assert!(msg.contains("pending_commit"));
        assert!(msg.contains("expired"));
    }
}
