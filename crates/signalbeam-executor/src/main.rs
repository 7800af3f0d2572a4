// signalbeam-executor/src/main.rs
// ============================================================================
// Module: SignalBeam Executor Daemon
// Description: Long-running rollout executor process.
// Purpose: Wire configuration, the SQLite store, the outbox relay, and the
// supervisor into one service.
// Dependencies: signalbeam-{broker,config,core,executor,store-sqlite},
// tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `signalbeam-executord` drives every configured tenant's rollouts: the
//! supervisor schedules reconcile ticks and the relay publishes outbox
//! events. Shutdown is signal-driven and drains cleanly at the next
//! suspension point.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::time::Duration;

use signalbeam_broker::OutboxRelay;
use signalbeam_broker::RelayConfig;
use signalbeam_broker::TracingSink;
use signalbeam_config::SignalBeamConfig;
use signalbeam_executor::Supervisor;
use signalbeam_executor::SupervisorConfig;
use signalbeam_store_sqlite::SqliteRolloutStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the executor daemon until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SignalBeamConfig::load(None)?;
    let tenants = config.executor_tenants()?;
    tracing::info!(tenant_count = tenants.len(), "signalbeam executor starting");

    let store = SqliteRolloutStore::new(&config.store)?;
    let supervisor = Supervisor::new(
        store.clone(),
        config.executor_config(),
        store.clone(),
        SupervisorConfig {
            tick_interval: Duration::from_millis(config.reconcile.tick_interval_ms),
            tick_deadline: Duration::from_millis(config.reconcile.tick_deadline_ms),
            occ_retry_limit: config.executor.occ_retry_limit,
            backoff_initial: Duration::from_millis(config.executor.backoff_initial_ms),
            backoff_ceiling: Duration::from_millis(config.executor.backoff_ceiling_ms),
            worker_shards: config.executor.worker_shards,
        },
    );

    let relay = OutboxRelay::new(store, TracingSink, RelayConfig {
        batch_size: config.executor.outbox_batch,
        poll_interval: Duration::from_millis(config.executor.outbox_poll_interval_ms),
        backoff_initial: Duration::from_millis(config.executor.backoff_initial_ms),
        backoff_ceiling: Duration::from_millis(config.executor.backoff_ceiling_ms),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let relay_shutdown = shutdown_rx.clone();
    let relay_task = tokio::spawn(async move { relay.run(relay_shutdown).await });
    let supervisor_task = tokio::spawn(supervisor.run(tenants, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    supervisor_task.await?;
    relay_task.await?;
    tracing::info!("signalbeam executor stopped");
    Ok(())
}
