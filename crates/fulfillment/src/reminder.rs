//! One-off commitment reminder sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use domain::reminder_after;
use ledger::Ledger;

use crate::error::Result;
use crate::orchestrator::OrderOrchestrator;
use crate::services::labels::LabelStore;
use crate::services::notify::{Notice, NotificationGateway};
use crate::services::payment::PaymentGateway;

/// Sends each seller one reminder halfway through the commitment window.
///
/// The ledger stamp is written before the email goes out, so a reminder is
/// at-most-once: a crash between stamp and send loses the email, which is
/// the acceptable side of that trade.
pub struct ReminderSweep<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    orchestrator: Arc<OrderOrchestrator<L, P, N, S>>,
}

impl<L, P, N, S> ReminderSweep<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    pub fn new(orchestrator: Arc<OrderOrchestrator<L, P, N, S>>) -> Self {
        Self { orchestrator }
    }

    /// Runs one reminder pass, returning how many reminders were sent.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self
            .orchestrator
            .ledger()
            .reminder_due_orders(now - reminder_after(), now)
            .await?;

        let mut sent = 0;
        for order in due {
            // Stamp first; losing the race means another sweep owns it.
            if !self
                .orchestrator
                .ledger()
                .stamp_reminder_sent(order.id, now)
                .await?
            {
                continue;
            }
            let Some(expires_at) = order.expires_at else {
                continue;
            };
            self.orchestrator
                .notify(
                    &order.seller_email,
                    Notice::CommitReminder {
                        order_id: order.id,
                        expires_at,
                    },
                )
                .await;
            sent += 1;
        }

        if sent > 0 {
            metrics::counter!("commit_reminders_sent_total").increment(sent as u64);
            tracing::info!(sent, "commitment reminders sent");
        }
        Ok(sent)
    }

    /// Runs reminder passes forever at the given interval.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "reminder sweep pass failed");
            }
        }
    }
}
