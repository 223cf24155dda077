//! Best-effort notification gateway.
//!
//! Email dispatch is fire-and-forget: the orchestrator logs failures and
//! never lets them block or roll back an order transition.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use common::{Money, OrderId};

/// A notification send failure. Always non-fatal to the caller.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// The notices the order core sends, one variant per email template.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Buyer confirmation covering a whole checkout.
    OrderPlaced {
        payment_reference: String,
        total: Money,
    },
    /// New order awaiting a seller's commitment.
    NewOrder {
        order_id: OrderId,
        expires_at: DateTime<Utc>,
    },
    /// One-off nudge at the halfway point of the commitment window.
    CommitReminder {
        order_id: OrderId,
        expires_at: DateTime<Utc>,
    },
    /// Seller committed; buyer informed.
    OrderCommitted { order_id: OrderId },
    /// Courier pickup booked.
    CourierBooked {
        order_id: OrderId,
        tracking_number: String,
    },
    /// Order declined by the seller; refund on its way.
    OrderDeclined { order_id: OrderId, reason: String },
    /// Order expired uncommitted; refund on its way.
    OrderExpired { order_id: OrderId },
    /// Parcel collected from the seller.
    OrderCollected { order_id: OrderId },
    /// Batch summary of a deadline sweep, for the operations address.
    SweepReport { expired: usize, failed: usize },
}

impl Notice {
    /// The email template this notice renders with.
    pub fn template(&self) -> &'static str {
        match self {
            Notice::OrderPlaced { .. } => "order_placed",
            Notice::NewOrder { .. } => "new_order",
            Notice::CommitReminder { .. } => "commit_reminder",
            Notice::OrderCommitted { .. } => "order_committed",
            Notice::CourierBooked { .. } => "courier_booked",
            Notice::OrderDeclined { .. } => "order_declined",
            Notice::OrderExpired { .. } => "order_expired",
            Notice::OrderCollected { .. } => "order_collected",
            Notice::SweepReport { .. } => "sweep_report",
        }
    }
}

/// Trait for outbound notification dispatch.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Sends one notice. Callers treat failure as advisory.
    async fn send(&self, to: &str, notice: Notice) -> Result<(), NotifyError>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(String, Notice)>,
    fail_on_send: bool,
}

/// In-memory notifier recording every send, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of notices sent.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the template names of notices sent to an address.
    pub fn sent_to(&self, address: &str) -> Vec<&'static str> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|(to, _)| to == address)
            .map(|(_, notice)| notice.template())
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotifier {
    async fn send(&self, to: &str, notice: Notice) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(NotifyError("smtp unavailable".to_string()));
        }
        state.sent.push((to.to_string(), notice));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_per_recipient() {
        let notifier = InMemoryNotifier::new();
        notifier
            .send(
                "buyer@uwc.ac.za",
                Notice::OrderPlaced {
                    payment_reference: "PAY_1".to_string(),
                    total: Money::from_rands(150),
                },
            )
            .await
            .unwrap();
        notifier
            .send(
                "seller@uwc.ac.za",
                Notice::NewOrder {
                    order_id: OrderId::new(),
                    expires_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert_eq!(notifier.sent_count(), 2);
        assert_eq!(notifier.sent_to("buyer@uwc.ac.za"), vec!["order_placed"]);
        assert_eq!(notifier.sent_to("seller@uwc.ac.za"), vec!["new_order"]);
    }

    #[tokio::test]
    async fn failure_toggle_rejects_sends() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);
        let result = notifier
            .send("ops@marketplace.local", Notice::SweepReport { expired: 1, failed: 0 })
            .await;
        assert!(result.is_err());
        assert_eq!(notifier.sent_count(), 0);
    }

    #[test]
    fn every_notice_has_a_template() {
        let id = OrderId::new();
        let now = Utc::now();
        let notices = [
            Notice::OrderPlaced {
                payment_reference: "PAY_1".to_string(),
                total: Money::zero(),
            },
            Notice::NewOrder { order_id: id, expires_at: now },
            Notice::CommitReminder { order_id: id, expires_at: now },
            Notice::OrderCommitted { order_id: id },
            Notice::CourierBooked {
                order_id: id,
                tracking_number: "X-1".to_string(),
            },
            Notice::OrderDeclined {
                order_id: id,
                reason: "damaged".to_string(),
            },
            Notice::OrderExpired { order_id: id },
            Notice::OrderCollected { order_id: id },
            Notice::SweepReport { expired: 0, failed: 0 },
        ];
        for notice in notices {
            assert!(!notice.template().is_empty());
        }
    }
}
