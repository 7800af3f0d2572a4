// signalbeam-executor/src/supervisor.rs
// ============================================================================
// Module: Rollout Supervisor
// Description: Actor-per-rollout host over the executor engine.
// Purpose: Serialize transitions per rollout, schedule periodic ticks per
// tenant shard, retry conflicts and transient failures, and forward alert
// signals.
// Dependencies: signalbeam-core, tokio, tracing, thiserror
// ============================================================================

//! ## Overview
//! One actor task exists per non-terminal rollout; every state transition
//! for that rollout flows through its actor, so transitions are totally
//! ordered per rollout while independent rollouts proceed in parallel.
//! Ticks run on the blocking pool under a deadline; a tick that overruns is
//! abandoned and rescheduled without advancing state (the commit itself is
//! atomic either way). Optimistic-concurrency conflicts retry from a fresh
//! load; transient store failures back off exponentially.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use signalbeam_core::AgentReport;
use signalbeam_core::AlertEngine;
use signalbeam_core::AlertSignal;
use signalbeam_core::AlertStore;
use signalbeam_core::Classify;
use signalbeam_core::ErrorClass;
use signalbeam_core::ExecutorConfig;
use signalbeam_core::ExecutorError;
use signalbeam_core::ReportOutcome;
use signalbeam_core::RolloutExecutor;
use signalbeam_core::RolloutId;
use signalbeam_core::RolloutStore;
use signalbeam_core::TenantId;
use signalbeam_core::TickReport;
use signalbeam_core::core::rollout::RollbackReason;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::backoff::Backoff;
use crate::clock::WallClock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wake-channel depth per actor; a full channel means a wake is pending.
const ACTOR_CHANNEL_DEPTH: usize = 8;
/// Retry attempts for transient failures within one operation.
const TRANSIENT_RETRY_LIMIT: u32 = 8;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Supervisor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Periodic tick interval per tenant shard.
    pub tick_interval: Duration,
    /// Deadline for one reconcile tick.
    pub tick_deadline: Duration,
    /// Optimistic-concurrency retries per operation.
    pub occ_retry_limit: u32,
    /// Initial transient backoff.
    pub backoff_initial: Duration,
    /// Transient backoff ceiling.
    pub backoff_ceiling: Duration,
    /// Tenant worker shard count.
    pub worker_shards: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            tick_deadline: Duration::from_secs(30),
            occ_retry_limit: 5,
            backoff_initial: Duration::from_millis(500),
            backoff_ceiling: Duration::from_secs(30),
            worker_shards: 4,
        }
    }
}

// ============================================================================
// SECTION: Wake Reasons
// ============================================================================

/// Why a rollout actor was woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Periodic scheduler tick.
    PeriodicTick,
    /// A device reported state for this rollout.
    DeviceReport,
    /// An operator retried a failed assignment.
    AssignmentRetried,
    /// The rollout was resumed.
    Resume,
}

// ============================================================================
// SECTION: Supervisor Errors
// ============================================================================

/// Errors surfaced by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The engine rejected the operation.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// A tick overran its deadline and was rescheduled.
    #[error("reconcile tick for rollout {rollout_id} exceeded its deadline")]
    TickTimeout {
        /// Rollout whose tick overran.
        rollout_id: RolloutId,
    },
    /// Conflict and transient retries were exhausted.
    #[error("retries exhausted for rollout {rollout_id} after {attempts} attempts")]
    RetriesExhausted {
        /// Target rollout.
        rollout_id: RolloutId,
        /// Attempts made.
        attempts: u32,
    },
    /// Report ingestion retries were exhausted.
    #[error("retries exhausted ingesting a report from device {device_id} after {attempts} attempts")]
    ReportRetriesExhausted {
        /// Reporting device.
        device_id: signalbeam_core::DeviceId,
        /// Attempts made.
        attempts: u32,
    },
    /// A blocking task failed to join.
    #[error("executor task failed: {0}")]
    TaskJoin(String),
}

impl Classify for SupervisorError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Executor(err) => err.class(),
            Self::TickTimeout {
                ..
            }
            | Self::RetriesExhausted {
                ..
            }
            | Self::ReportRetriesExhausted {
                ..
            }
            | Self::TaskJoin(_) => ErrorClass::Transient,
        }
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Actor-per-rollout supervisor over a store and an alert store.
pub struct Supervisor<S, A> {
    /// Store handle used for tenant scans.
    store: S,
    /// The deterministic rollout engine.
    executor: Arc<RolloutExecutor<S>>,
    /// Alert engine consuming rollout signals.
    alerts: AlertEngine<A>,
    /// Supervisor configuration.
    config: SupervisorConfig,
    /// Wake channels of live actors.
    actors: Mutex<HashMap<RolloutId, mpsc::Sender<WakeReason>>>,
    /// Self handle used to hand actors an owning reference.
    weak_self: Weak<Self>,
}

impl<S, A> Supervisor<S, A>
where
    S: RolloutStore + Clone + Send + Sync + 'static,
    A: AlertStore + Send + Sync + 'static,
{
    /// Creates a supervisor.
    pub fn new(
        store: S,
        executor_config: ExecutorConfig,
        alert_store: A,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            executor: Arc::new(RolloutExecutor::new(store.clone(), executor_config)),
            store,
            alerts: AlertEngine::new(alert_store),
            config,
            actors: Mutex::new(HashMap::new()),
            weak_self: weak_self.clone(),
        })
    }

    /// Runs tenant-sharded periodic scheduling until shutdown.
    ///
    /// Tenants are distributed round-robin across the configured shard
    /// count; each shard scans its tenants every tick interval.
    pub async fn run(self: Arc<Self>, tenants: Vec<TenantId>, shutdown: watch::Receiver<bool>) {
        let shard_count = self.config.worker_shards.max(1);
        let mut shards: Vec<Vec<TenantId>> = vec![Vec::new(); shard_count];
        for (index, tenant) in tenants.into_iter().enumerate() {
            shards[index % shard_count].push(tenant);
        }

        let mut tasks = JoinSet::new();
        for (shard_index, shard) in shards.into_iter().enumerate() {
            if shard.is_empty() {
                continue;
            }
            let supervisor = Arc::clone(&self);
            let shard_shutdown = shutdown.clone();
            tasks.spawn(
                async move { supervisor.scheduler_loop(shard, shard_shutdown).await }
                    .instrument(tracing::info_span!("shard", shard_index)),
            );
        }
        while tasks.join_next().await.is_some() {}

        // Closing the wake channels lets idle actors drain and exit.
        if let Ok(mut actors) = self.actors.lock() {
            actors.clear();
        }
    }

    /// Scans a shard's tenants on every tick interval.
    async fn scheduler_loop(
        self: Arc<Self>,
        tenants: Vec<TenantId>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            for tenant in &tenants {
                if let Err(err) = self.scan_tenant(*tenant) {
                    tracing::warn!(tenant = %tenant, error = %err, "tenant scan failed");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Wakes every non-terminal rollout of a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the store scan fails.
    pub fn scan_tenant(&self, tenant_id: TenantId) -> Result<usize, SupervisorError> {
        let rollouts = self
            .store
            .list_open_rollouts(tenant_id)
            .map_err(|err| SupervisorError::Executor(ExecutorError::Store(err)))?;
        let count = rollouts.len();
        for rollout_id in rollouts {
            self.wake(rollout_id, WakeReason::PeriodicTick);
        }
        Ok(count)
    }

    /// Wakes a rollout's actor, spawning it on first contact.
    ///
    /// A full wake channel is not an error: a wake is already pending and
    /// the next tick observes the latest state anyway.
    pub fn wake(&self, rollout_id: RolloutId, reason: WakeReason) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        let sender = {
            let Ok(mut actors) = self.actors.lock() else {
                tracing::error!("actor registry lock poisoned");
                return;
            };
            match actors.get(&rollout_id) {
                Some(sender) if !sender.is_closed() => sender.clone(),
                _ => {
                    let sender = Self::spawn_actor(this, rollout_id);
                    actors.insert(rollout_id, sender.clone());
                    sender
                }
            }
        };
        let _ = sender.try_send(reason);
    }

    /// Spawns the actor task for one rollout.
    fn spawn_actor(supervisor: Arc<Self>, rollout_id: RolloutId) -> mpsc::Sender<WakeReason> {
        let (sender, receiver) = mpsc::channel(ACTOR_CHANNEL_DEPTH);
        tokio::spawn(
            async move { supervisor.actor_loop(rollout_id, receiver).await }
                .instrument(tracing::info_span!("rollout_actor", rollout_id = %rollout_id)),
        );
        sender
    }

    /// Serializes every tick for one rollout; exits when it turns terminal.
    async fn actor_loop(
        self: Arc<Self>,
        rollout_id: RolloutId,
        mut receiver: mpsc::Receiver<WakeReason>,
    ) {
        while let Some(reason) = receiver.recv().await {
            tracing::debug!(?reason, "actor woke");
            match self.tick_with_retry(rollout_id).await {
                Ok(report) => {
                    if report.status.is_terminal() {
                        tracing::info!(status = ?report.status, "rollout reached a terminal state");
                        break;
                    }
                }
                Err(err) => match err.class() {
                    ErrorClass::Transient | ErrorClass::Conflict => {
                        tracing::warn!(error = %err, "tick deferred; will retry on next wake");
                    }
                    ErrorClass::NotFound => {
                        tracing::warn!(error = %err, "rollout disappeared; stopping actor");
                        break;
                    }
                    ErrorClass::Validation | ErrorClass::Fatal => {
                        tracing::error!(error = %err, "tick failed; stopping actor");
                        break;
                    }
                },
            }
        }
        drop(receiver);
        if let Ok(mut actors) = self.actors.lock() {
            // Only clear the registry entry if it still points at this
            // actor; a replacement may already have been spawned.
            if actors.get(&rollout_id).is_some_and(mpsc::Sender::is_closed) {
                actors.remove(&rollout_id);
            }
        }
    }

    /// Runs one tick under the deadline with conflict and transient
    /// retries. Alert signals are forwarded before returning.
    async fn tick_with_retry(&self, rollout_id: RolloutId) -> Result<TickReport, SupervisorError> {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_ceiling);
        let mut attempts = 0u32;
        let limit = self.config.occ_retry_limit.max(1) + TRANSIENT_RETRY_LIMIT;

        while attempts < limit {
            attempts += 1;
            let executor = Arc::clone(&self.executor);
            let task = tokio::task::spawn_blocking(move || {
                executor.reconcile_tick(rollout_id, WallClock::now())
            });

            let joined = match tokio::time::timeout(self.config.tick_deadline, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // Abandon the overrunning tick; its commit either lands
                    // atomically or conflicts with the rescheduled one.
                    return Err(SupervisorError::TickTimeout {
                        rollout_id,
                    });
                }
            };
            let result = joined.map_err(|err| SupervisorError::TaskJoin(err.to_string()))?;

            match result {
                Ok(report) => {
                    self.forward_signals(&report.signals);
                    return Ok(report);
                }
                Err(err) => match err.class() {
                    ErrorClass::Conflict => {
                        tracing::debug!(error = %err, attempts, "commit conflicted; reloading");
                    }
                    ErrorClass::Transient => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error = %err, ?delay, "transient failure; backing off");
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(SupervisorError::Executor(err)),
                },
            }
        }

        Err(SupervisorError::RetriesExhausted {
            rollout_id,
            attempts,
        })
    }

    /// Forwards tick signals to the alert engine.
    fn forward_signals(&self, signals: &[AlertSignal]) {
        for signal in signals {
            if let Err(err) = self.alerts.observe(signal) {
                tracing::error!(error = %err, "alert signal dropped");
            }
        }
    }

    // ========================================================================
    // SECTION: Operator Surface
    // ========================================================================

    /// Starts a pending rollout and wakes its actor.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the start.
    pub async fn start_rollout(
        &self,
        rollout_id: RolloutId,
    ) -> Result<TickReport, SupervisorError> {
        let report = self
            .operation_with_retry(rollout_id, |executor| {
                executor.start(rollout_id, WallClock::now())
            })
            .await?;
        self.wake(rollout_id, WakeReason::PeriodicTick);
        Ok(report)
    }

    /// Pauses an in-progress rollout.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the pause.
    pub async fn pause_rollout(
        &self,
        rollout_id: RolloutId,
    ) -> Result<TickReport, SupervisorError> {
        self.operation_with_retry(rollout_id, |executor| {
            executor.pause(rollout_id, WallClock::now())
        })
        .await
    }

    /// Resumes a paused rollout and reconciles immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the resume.
    pub async fn resume_rollout(
        &self,
        rollout_id: RolloutId,
    ) -> Result<TickReport, SupervisorError> {
        let report = self
            .operation_with_retry(rollout_id, |executor| {
                executor.resume(rollout_id, WallClock::now())
            })
            .await?;
        self.wake(rollout_id, WakeReason::Resume);
        Ok(report)
    }

    /// Cancels a non-terminal rollout.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the cancel.
    pub async fn cancel_rollout(
        &self,
        rollout_id: RolloutId,
    ) -> Result<TickReport, SupervisorError> {
        self.operation_with_retry(rollout_id, |executor| {
            executor.cancel(rollout_id, WallClock::now())
        })
        .await
    }

    /// Rolls back a rollout for the given reason.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the rollback.
    pub async fn rollback_rollout(
        &self,
        rollout_id: RolloutId,
        reason: RollbackReason,
    ) -> Result<TickReport, SupervisorError> {
        let report = self
            .operation_with_retry(rollout_id, move |executor| {
                executor.rollback(rollout_id, reason, WallClock::now())
            })
            .await?;
        self.forward_signals(&report.signals);
        Ok(report)
    }

    /// Retries a failed assignment and wakes the rollout.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the engine rejects the retry.
    pub async fn retry_assignment(
        &self,
        rollout_id: RolloutId,
        device_id: signalbeam_core::DeviceId,
    ) -> Result<TickReport, SupervisorError> {
        let report = self
            .operation_with_retry(rollout_id, move |executor| {
                executor.retry_assignment(rollout_id, device_id, WallClock::now())
            })
            .await?;
        self.wake(rollout_id, WakeReason::AssignmentRetried);
        Ok(report)
    }

    /// Ingests an agent report and wakes the affected rollout.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the store repeatedly fails.
    pub async fn ingest_report(
        &self,
        tenant_id: TenantId,
        report: AgentReport,
    ) -> Result<ReportOutcome, SupervisorError> {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_ceiling);
        let mut attempts = 0u32;
        let limit = self.config.occ_retry_limit.max(1) + TRANSIENT_RETRY_LIMIT;

        while attempts < limit {
            attempts += 1;
            match self.executor.record_report(tenant_id, &report, WallClock::now()) {
                Ok(outcome) => {
                    if let ReportOutcome::Applied {
                        rollout_id, ..
                    } = outcome
                    {
                        self.wake(rollout_id, WakeReason::DeviceReport);
                    }
                    return Ok(outcome);
                }
                Err(err) => match err.class() {
                    ErrorClass::Conflict => {}
                    ErrorClass::Transient => tokio::time::sleep(backoff.next_delay()).await,
                    _ => return Err(SupervisorError::Executor(err)),
                },
            }
        }

        Err(SupervisorError::ReportRetriesExhausted {
            device_id: report.device_id,
            attempts,
        })
    }

    /// Runs one engine operation with conflict and transient retries.
    async fn operation_with_retry<T, F>(
        &self,
        rollout_id: RolloutId,
        operation: F,
    ) -> Result<T, SupervisorError>
    where
        F: Fn(&RolloutExecutor<S>) -> Result<T, ExecutorError>,
    {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_ceiling);
        let mut attempts = 0u32;
        let limit = self.config.occ_retry_limit.max(1) + TRANSIENT_RETRY_LIMIT;

        while attempts < limit {
            attempts += 1;
            match operation(&self.executor) {
                Ok(value) => return Ok(value),
                Err(err) => match err.class() {
                    ErrorClass::Conflict if matches!(err, ExecutorError::Store(_)) => {
                        tracing::debug!(error = %err, attempts, "operation conflicted; retrying");
                    }
                    ErrorClass::Transient => tokio::time::sleep(backoff.next_delay()).await,
                    _ => return Err(SupervisorError::Executor(err)),
                },
            }
        }

        Err(SupervisorError::RetriesExhausted {
            rollout_id,
            attempts,
        })
    }
}
