//! Payment transaction and refund records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Money, OrderId};

/// Status of a payment transaction at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// One buyer charge, possibly funding several sibling orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Gateway reference, shared by all sibling orders of one checkout.
    pub reference: String,
    pub amount: Money,
    pub status: PaymentStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    /// A transaction verified as successful at `verified_at`.
    pub fn verified(reference: impl Into<String>, amount: Money, verified_at: DateTime<Utc>) -> Self {
        Self {
            reference: reference.into(),
            amount,
            status: PaymentStatus::Success,
            verified_at: Some(verified_at),
        }
    }
}

/// Why an order was refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    DeclinedBySeller,
    OverdueCommit,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::DeclinedBySeller => "declined_by_seller",
            RefundReason::OverdueCommit => "overdue_commit",
        }
    }

    /// Parses a stored reason string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "declined_by_seller" => Some(RefundReason::DeclinedBySeller),
            "overdue_commit" => Some(RefundReason::OverdueCommit),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a refund attempt.
///
/// A gateway failure is still recorded (as `Failed`) so reconciliation can
/// follow up by hand; it never blocks the order's status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Completed => "completed",
            RefundStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(RefundStatus::Completed),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

/// A refund issued (or attempted) against one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: RefundReason,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        order_id: OrderId,
        amount: Money,
        reason: RefundReason,
        status: RefundStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            amount,
            reason,
            status,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_transaction_is_success() {
        let now = Utc::now();
        let tx = PaymentTransaction::verified("PAY_1", Money::from_rands(150), now);
        assert_eq!(tx.status, PaymentStatus::Success);
        assert_eq!(tx.verified_at, Some(now));
    }

    #[test]
    fn refund_reason_strings() {
        assert_eq!(RefundReason::DeclinedBySeller.as_str(), "declined_by_seller");
        assert_eq!(RefundReason::OverdueCommit.as_str(), "overdue_commit");
    }

    #[test]
    fn refund_serializes_snake_case() {
        let r = Refund::new(
            OrderId::new(),
            Money::from_rands(100),
            RefundReason::OverdueCommit,
            RefundStatus::Completed,
            Utc::now(),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["reason"], "overdue_commit");
        assert_eq!(json["status"], "completed");
    }
}
