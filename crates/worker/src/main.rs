//! Background worker entry point.
//!
//! Runs the deadline sweep (expiring overdue orders) and the commitment
//! reminder sweep on their own intervals until a shutdown signal arrives.

mod config;

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use common::Money;
use fulfillment::{
    CourierDispatcher, CourierProvider, DeadlineSweeper, InMemoryCourierProvider,
    InMemoryLabelStore, InMemoryNotifier, InMemoryPaymentGateway, OrderOrchestrator, ReminderSweep,
};
use ledger::{InMemoryLedger, Ledger, PostgresLedger};

use crate::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Wires the orchestrator over the given ledger and runs both sweep loops
/// until shutdown.
async fn run_with_ledger<L>(ledger: L, config: Config)
where
    L: Ledger + 'static,
{
    // Courier providers are tried in this order; the second is the fallback.
    let providers: Vec<Arc<dyn CourierProvider>> = vec![
        Arc::new(InMemoryCourierProvider::new(
            "courier-guy",
            Money::from_rands(85),
        )),
        Arc::new(InMemoryCourierProvider::new(
            "fastway",
            Money::from_rands(95),
        )),
    ];
    let courier = CourierDispatcher::new(providers);

    let orchestrator = Arc::new(OrderOrchestrator::new(
        ledger,
        InMemoryPaymentGateway::new(),
        courier,
        InMemoryNotifier::new(),
        InMemoryLabelStore::new(),
    ));

    let sweeper = DeadlineSweeper::new(orchestrator.clone(), config.ops_email.clone());
    let sweep_interval = config.sweep_interval;
    let sweep_task = tokio::spawn(async move {
        sweeper.run(sweep_interval).await;
    });

    let reminder = ReminderSweep::new(orchestrator);
    let reminder_interval = config.reminder_interval;
    let reminder_task = tokio::spawn(async move {
        reminder.run(reminder_interval).await;
    });

    tracing::info!(
        sweep_secs = sweep_interval.as_secs(),
        reminder_secs = reminder_interval.as_secs(),
        "worker running"
    );
    shutdown_signal().await;

    sweep_task.abort();
    reminder_task.abort();
    tracing::info!("worker shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the ledger backend and run
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to database");
            let ledger = PostgresLedger::new(pool);
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL ledger");
            run_with_ledger(ledger, config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            run_with_ledger(InMemoryLedger::new(), config).await;
        }
    }
}
