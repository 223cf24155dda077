//! Background sweep expiring overdue orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::OrderId;
use ledger::Ledger;

use crate::error::Result;
use crate::orchestrator::OrderOrchestrator;
use crate::services::labels::LabelStore;
use crate::services::notify::{Notice, NotificationGateway};
use crate::services::payment::PaymentGateway;

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Overdue orders considered.
    pub scanned: usize,
    /// Orders this pass actually expired.
    pub expired: Vec<OrderId>,
    /// Orders whose expiry attempt errored, with the error text.
    pub failed: Vec<(OrderId, String)>,
}

/// Periodically expires `pending_commit` orders past their deadline.
///
/// Each order is expired through the orchestrator's conditional path, so
/// overlapping sweeps (or a sweep racing a seller's commit) are safe: at
/// most one actor wins each order.
pub struct DeadlineSweeper<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    orchestrator: Arc<OrderOrchestrator<L, P, N, S>>,
    ops_email: String,
}

impl<L, P, N, S> DeadlineSweeper<L, P, N, S>
where
    L: Ledger,
    P: PaymentGateway,
    N: NotificationGateway,
    S: LabelStore,
{
    pub fn new(orchestrator: Arc<OrderOrchestrator<L, P, N, S>>, ops_email: impl Into<String>) -> Self {
        Self {
            orchestrator,
            ops_email: ops_email.into(),
        }
    }

    /// Runs one sweep pass and reports what happened.
    ///
    /// Per-order failures are collected, not raised, so one bad order
    /// cannot stall the rest of the batch.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let overdue = self.orchestrator.ledger().overdue_orders(now).await?;

        let mut report = SweepReport {
            scanned: overdue.len(),
            ..SweepReport::default()
        };
        for order in overdue {
            match self.orchestrator.expire(order.id).await {
                Ok(true) => report.expired.push(order.id),
                // Someone else resolved the order between the scan and
                // the expiry attempt.
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(order_id = %order.id, error = %err, "expiry failed");
                    report.failed.push((order.id, err.to_string()));
                }
            }
        }

        metrics::counter!("sweep_runs_total").increment(1);
        if !report.expired.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired.len(),
                failed = report.failed.len(),
                "deadline sweep completed"
            );
            self.orchestrator
                .notify(
                    &self.ops_email,
                    Notice::SweepReport {
                        expired: report.expired.len(),
                        failed: report.failed.len(),
                    },
                )
                .await;
        }

        Ok(report)
    }

    /// Runs sweep passes forever at the given interval.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "deadline sweep pass failed");
            }
        }
    }
}
