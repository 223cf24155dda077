//! Fulfillment error taxonomy.

use thiserror::Error;

use common::{BookId, OrderId, UserId};
use domain::OrderStatus;
use ledger::LedgerError;

/// Errors that can occur while orchestrating the order lifecycle.
///
/// Checkout-aborting errors (`Validation`, `SelfPurchase`,
/// `InventoryConflict`, `PaymentFailed`) are raised before any state the
/// buyer would have to unwind. `CourierBookingFailed` leaves the order in
/// `committed` so booking can be redriven. Refund and notification failures
/// never surface here from the compensation path; they are logged and, for
/// refunds, durably recorded.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Missing or malformed input, rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A race on book availability; the whole checkout was rejected.
    #[error("Books no longer available: {}", format_ids(.0))]
    InventoryConflict(Vec<BookId>),

    /// The buyer owns one of the carted listings.
    #[error("Buyer {buyer_id} cannot purchase their own listing")]
    SelfPurchase { buyer_id: UserId },

    /// Payment charge or verification failed; no orders were created.
    #[error("Payment failed for reference {reference}: {reason}")]
    PaymentFailed { reference: String, reason: String },

    /// Every configured courier provider refused the booking.
    /// The order stays `committed`; booking can be retried.
    #[error("Courier booking failed: {}", attempts.join("; "))]
    CourierBookingFailed { attempts: Vec<String> },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The caller is not the seller of this order.
    #[error("Caller is not the seller of order {0}")]
    NotOrderSeller(OrderId),

    /// The order's current status does not permit the requested action.
    #[error("Cannot {action} order {order_id}: status is {actual}")]
    InvalidTransition {
        order_id: OrderId,
        actual: OrderStatus,
        action: &'static str,
    },

    /// Ledger store error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

fn format_ids(ids: &[BookId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courier_failure_aggregates_all_attempts() {
        let err = FulfillmentError::CourierBookingFailed {
            attempts: vec![
                "courier-guy: connection refused".to_string(),
                "fastway: declared value too high".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("courier-guy: connection refused"));
        assert!(msg.contains("fastway: declared value too high"));
    }

    #[test]
    fn ledger_errors_convert() {
        let err: FulfillmentError = LedgerError::OrderNotFound(OrderId::new()).into();
        assert!(matches!(err, FulfillmentError::Ledger(_)));
    }
}
