//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions:
/// ```text
/// PendingCommit ──► Committed ──► CourierScheduled ──► Collected ──► Delivered
///       │
///       ├──► Declined   (seller action, compensated)
///       └──► Expired    (deadline sweep, compensated)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting seller commitment; `expires_at` is set only in this status.
    #[default]
    PendingCommit,

    /// Seller committed; courier booking pending or failed (retryable).
    Committed,

    /// Courier pickup booked, tracking fields populated.
    CourierScheduled,

    /// Courier collected the parcel from the seller.
    Collected,

    /// Delivered to the buyer (terminal).
    Delivered,

    /// Seller declined; refunded and books released (terminal).
    Declined,

    /// Commitment deadline passed; refunded and books released (terminal).
    Expired,
}

impl OrderStatus {
    /// Returns true if a seller can still commit or decline.
    pub fn can_commit(&self) -> bool {
        matches!(self, OrderStatus::PendingCommit)
    }

    /// Returns true if the parcel can be marked collected.
    pub fn can_collect(&self) -> bool {
        matches!(self, OrderStatus::Committed | OrderStatus::CourierScheduled)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Declined | OrderStatus::Expired
        )
    }

    /// Returns the status name in the stored (snake_case) form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingCommit => "pending_commit",
            OrderStatus::Committed => "committed",
            OrderStatus::CourierScheduled => "courier_scheduled",
            OrderStatus::Collected => "collected",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Declined => "declined",
            OrderStatus::Expired => "expired",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_commit" => Some(OrderStatus::PendingCommit),
            "committed" => Some(OrderStatus::Committed),
            "courier_scheduled" => Some(OrderStatus::CourierScheduled),
            "collected" => Some(OrderStatus::Collected),
            "delivered" => Some(OrderStatus::Delivered),
            "declined" => Some(OrderStatus::Declined),
            "expired" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
