// signalbeam-core/src/runtime/executor.rs
// ============================================================================
// Module: SignalBeam Rollout Executor
// Description: The rollout state machine and reconcile-tick engine.
// Purpose: Drive every non-terminal rollout to a terminal state through
// health-gated advancement, threshold rollback, and operator actions.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! The executor is synchronous and deterministic: every operation loads the
//! aggregate, computes a transition against the supplied `now`, and writes
//! one atomic commit conditional on the optimistic-concurrency version.
//! Hosts serialize operations per rollout and retry version conflicts from
//! a fresh load. A quiescent tick commits nothing and emits nothing.
//!
//! Alert-worthy observations (threshold breach, high failure rate, stalls)
//! are returned as signals; the host forwards them to the alert engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AlertSeverity;
use crate::core::AlertSignal;
use crate::core::AlertType;
use crate::core::AgentReport;
use crate::core::Classify;
use crate::core::DeploymentStatus;
use crate::core::DesiredStateWrite;
use crate::core::DeviceId;
use crate::core::DomainEvent;
use crate::core::DurationMillis;
use crate::core::ErrorClass;
use crate::core::RolloutAggregate;
use crate::core::RolloutId;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::rollout::AssignmentStatus;
use crate::core::rollout::InvariantViolation;
use crate::core::rollout::PhaseStatus;
use crate::core::rollout::RollbackReason;
use crate::core::rollout::RolloutStatus;
use crate::interfaces::RolloutCommit;
use crate::interfaces::RolloutStore;
use crate::interfaces::StoreError;
use crate::interfaces::StoreVersion;
use crate::interfaces::VersionedRollout;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Executor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum failed attempts before an assignment is terminally failed.
    pub max_assignment_retries: u32,
    /// Reconciling devices missing reports for this long are failed.
    pub heartbeat_deadline: DurationMillis,
    /// Phases in progress past this duration raise a stall alert.
    pub stall_alert_after: DurationMillis,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_assignment_retries: 3,
            heartbeat_deadline: DurationMillis::from_minutes(15),
            stall_alert_after: DurationMillis::from_minutes(24 * 60),
        }
    }
}

// ============================================================================
// SECTION: Reports and Outcomes
// ============================================================================

/// Outcome of one executor operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Rollout the operation ran against.
    pub rollout_id: RolloutId,
    /// Rollout status after the operation.
    pub status: RolloutStatus,
    /// True when state was committed; a quiescent tick leaves this false.
    pub changed: bool,
    /// Alert signals observed during the operation.
    pub signals: Vec<AlertSignal>,
}

/// Outcome of ingesting one agent report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The device holds no non-terminal assignment; nothing was written.
    NoActiveAssignment,
    /// The report was applied to an assignment.
    Applied {
        /// Rollout holding the assignment.
        rollout_id: RolloutId,
        /// Assignment status after the report.
        assignment_status: AssignmentStatus,
    },
}

// ============================================================================
// SECTION: Executor Errors
// ============================================================================

/// Errors produced by executor operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The rollout does not exist.
    #[error("rollout not found: {0}")]
    RolloutNotFound(RolloutId),
    /// The operation is not valid in the rollout's current status.
    #[error("cannot {action} rollout {rollout_id} in status {status:?}")]
    InvalidTransition {
        /// Target rollout.
        rollout_id: RolloutId,
        /// Status at load time.
        status: RolloutStatus,
        /// Attempted action.
        action: &'static str,
    },
    /// No assignment exists for the device in this rollout.
    #[error("rollout {rollout_id} has no assignment for device {device_id}")]
    AssignmentNotFound {
        /// Target rollout.
        rollout_id: RolloutId,
        /// Missing device.
        device_id: DeviceId,
    },
    /// Retry was requested for an assignment that is not failed.
    #[error("assignment for device {device_id} is {status:?}, not failed")]
    RetryNotAllowed {
        /// Target device.
        device_id: DeviceId,
        /// Assignment status at load time.
        status: AssignmentStatus,
    },
    /// The assignment exhausted its retry budget.
    #[error("assignment for device {device_id} reached the retry limit ({retry_count})")]
    RetryLimitReached {
        /// Target device.
        device_id: DeviceId,
        /// Failed attempts so far.
        retry_count: u32,
    },
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The aggregate violated a structural invariant.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl Classify for ExecutorError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::RolloutNotFound(_)
            | Self::AssignmentNotFound {
                ..
            } => ErrorClass::NotFound,
            Self::InvalidTransition {
                ..
            }
            | Self::RetryNotAllowed {
                ..
            } => ErrorClass::Conflict,
            Self::RetryLimitReached {
                ..
            } => ErrorClass::Validation,
            Self::Store(err) => err.class(),
            Self::Invariant(_) => ErrorClass::Fatal,
        }
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// The rollout executor over a rollout store.
pub struct RolloutExecutor<S> {
    /// Rollout store.
    store: S,
    /// Executor configuration.
    config: ExecutorConfig,
}

impl<S: RolloutStore> RolloutExecutor<S> {
    /// Creates an executor.
    pub const fn new(store: S, config: ExecutorConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Returns the executor configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Starts a pending rollout: phase 1 goes in progress and its devices
    /// receive the target version.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTransition`] unless the rollout is
    /// `Pending`.
    pub fn start(&self, rollout_id: RolloutId, now: Timestamp) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        let rollout_status = original.rollout.status;
        if rollout_status != RolloutStatus::Pending || original.rollout.current_phase_number != 0 {
            return Err(ExecutorError::InvalidTransition {
                rollout_id,
                status: rollout_status,
                action: "start",
            });
        }

        let mut updated = original.clone();
        let mut writes = Vec::new();
        let mut events = vec![DomainEvent::RolloutStarted {
            rollout_id,
            tenant_id: updated.rollout.tenant_id,
            at: now,
        }];

        updated.rollout.status = RolloutStatus::InProgress;
        updated.rollout.started_at = Some(now);
        updated.rollout.current_phase_number = 1;
        begin_phase(&mut updated, 1, now, &mut writes, &mut events);

        let commit = diff_commit(&original, &updated, loaded.version, writes, events);
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: updated.rollout.status,
            changed: true,
            signals: Vec::new(),
        })
    }

    /// Pauses an in-progress rollout. In-flight assignments continue; no
    /// phase transitions occur until resume.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTransition`] unless the rollout is
    /// `InProgress`.
    pub fn pause(&self, rollout_id: RolloutId, now: Timestamp) -> Result<TickReport, ExecutorError> {
        self.switch_status(rollout_id, RolloutStatus::InProgress, RolloutStatus::Paused, "pause", now)
    }

    /// Resumes a paused rollout. The host should reconcile immediately
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTransition`] unless the rollout is
    /// `Paused`.
    pub fn resume(
        &self,
        rollout_id: RolloutId,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        self.switch_status(rollout_id, RolloutStatus::Paused, RolloutStatus::InProgress, "resume", now)
    }

    /// Cancels a non-terminal rollout: it fails, remaining phases and
    /// assignments are skipped, and desired states are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTransition`] when already terminal.
    pub fn cancel(
        &self,
        rollout_id: RolloutId,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        if original.rollout.status.is_terminal() {
            return Err(ExecutorError::InvalidTransition {
                rollout_id,
                status: original.rollout.status,
                action: "cancel",
            });
        }

        let mut updated = original.clone();
        updated.rollout.status = RolloutStatus::Failed;
        updated.rollout.completed_at = Some(now);
        skip_open_work(&mut updated, now);

        let events = vec![DomainEvent::RolloutFailed {
            rollout_id,
            tenant_id: updated.rollout.tenant_id,
            reason: "cancelled by operator".to_string(),
            at: now,
        }];
        let commit = diff_commit(&original, &updated, loaded.version, Vec::new(), events);
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: RolloutStatus::Failed,
            changed: true,
            signals: Vec::new(),
        })
    }

    /// Rolls back a rollout: every device that received the target version
    /// is reset to the previous version (or cleared), open work is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidTransition`] unless the rollout is
    /// `InProgress` or `Paused`.
    pub fn rollback(
        &self,
        rollout_id: RolloutId,
        reason: RollbackReason,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        if !matches!(original.rollout.status, RolloutStatus::InProgress | RolloutStatus::Paused) {
            return Err(ExecutorError::InvalidTransition {
                rollout_id,
                status: original.rollout.status,
                action: "rollback",
            });
        }

        let mut updated = original.clone();
        let mut writes = Vec::new();
        let mut events = Vec::new();
        let signals = rollback_transition(&mut updated, reason, now, &mut writes, &mut events);

        let commit = diff_commit(&original, &updated, loaded.version, writes, events);
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: RolloutStatus::RolledBack,
            changed: true,
            signals,
        })
    }

    /// Retries a failed assignment: the device goes back to `Reconciling`
    /// and its desired state is re-written.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::RetryNotAllowed`] unless the assignment is
    /// `Failed`, or [`ExecutorError::RetryLimitReached`] when the retry
    /// budget is spent.
    pub fn retry_assignment(
        &self,
        rollout_id: RolloutId,
        device_id: DeviceId,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        if !matches!(original.rollout.status, RolloutStatus::InProgress | RolloutStatus::Paused) {
            return Err(ExecutorError::InvalidTransition {
                rollout_id,
                status: original.rollout.status,
                action: "retry an assignment of",
            });
        }

        let mut updated = original.clone();
        let tenant_id = updated.rollout.tenant_id;
        let bundle_id = updated.rollout.bundle_id;
        let target_version = updated.rollout.target_version.clone();
        let max_retries = self.config.max_assignment_retries;

        let mut found = false;
        for state in &mut updated.phases {
            let Some(assignment) =
                state.assignments.iter_mut().find(|assignment| assignment.device_id == device_id)
            else {
                continue;
            };
            found = true;
            if assignment.status != AssignmentStatus::Failed {
                return Err(ExecutorError::RetryNotAllowed {
                    device_id,
                    status: assignment.status,
                });
            }
            if assignment.retry_count >= max_retries {
                return Err(ExecutorError::RetryLimitReached {
                    device_id,
                    retry_count: assignment.retry_count,
                });
            }
            assignment.status = AssignmentStatus::Reconciling;
            assignment.retry_count += 1;
            assignment.error_message = None;
            assignment.reconciled_at = None;
            assignment.last_report_at = Some(now);
            state.phase.failure_count = state.phase.failure_count.saturating_sub(1);
            break;
        }
        if !found {
            return Err(ExecutorError::AssignmentNotFound {
                rollout_id,
                device_id,
            });
        }

        // Re-assert the desired state; the index treats an unchanged value
        // as a no-op.
        let writes = vec![DesiredStateWrite::Assign {
            device_id,
            tenant_id,
            bundle_id,
            version: target_version,
            assigned_by: format!("rollout:{rollout_id}"),
            assigned_at: now,
        }];

        let commit = diff_commit(&original, &updated, loaded.version, writes, Vec::new());
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: updated.rollout.status,
            changed: true,
            signals: Vec::new(),
        })
    }

    /// Ingests an agent report, advancing the device's assignment.
    ///
    /// Per-device transitions are applied even while the rollout is paused;
    /// only phase transitions wait for resume.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the store fails. A report for a
    /// device without an active assignment is not an error.
    pub fn record_report(
        &self,
        tenant_id: TenantId,
        report: &AgentReport,
        now: Timestamp,
    ) -> Result<ReportOutcome, ExecutorError> {
        let Some(rollout_id) =
            self.store.find_active_rollout_for_device(tenant_id, report.device_id)?
        else {
            return Ok(ReportOutcome::NoActiveAssignment);
        };

        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        let mut updated = original.clone();
        let target_version = updated.rollout.target_version.clone();

        let mut outcome_status = None;
        for state in &mut updated.phases {
            let Some(assignment) = state
                .assignments
                .iter_mut()
                .find(|assignment| assignment.device_id == report.device_id)
            else {
                continue;
            };
            if assignment.status.is_terminal() {
                return Ok(ReportOutcome::Applied {
                    rollout_id,
                    assignment_status: assignment.status,
                });
            }

            assignment.last_report_at = Some(now);
            let runs_target = report.current_version.as_ref() == Some(&target_version);
            match assignment.status {
                AssignmentStatus::Pending => {
                    // The phase has not dispatched this device yet; the
                    // report only refreshes liveness.
                }
                AssignmentStatus::Assigned | AssignmentStatus::Reconciling => {
                    match report.deployment_status {
                        DeploymentStatus::Failed => {
                            assignment.status = AssignmentStatus::Failed;
                            assignment.retry_count += 1;
                            assignment.reconciled_at = Some(now);
                            assignment.error_message = Some(
                                report
                                    .reconciliation_error
                                    .clone()
                                    .unwrap_or_else(|| "agent reported failure".to_string()),
                            );
                            state.phase.failure_count += 1;
                        }
                        DeploymentStatus::Succeeded if runs_target => {
                            assignment.status = AssignmentStatus::Succeeded;
                            assignment.reconciled_at = Some(now);
                            state.phase.success_count += 1;
                        }
                        DeploymentStatus::Reconciling | DeploymentStatus::Succeeded => {
                            assignment.status = AssignmentStatus::Reconciling;
                        }
                        DeploymentStatus::Pending => {
                            if runs_target || assignment.status == AssignmentStatus::Reconciling {
                                assignment.status = AssignmentStatus::Reconciling;
                            }
                        }
                    }
                }
                AssignmentStatus::Succeeded
                | AssignmentStatus::Failed
                | AssignmentStatus::Skipped => {}
            }
            outcome_status = Some(assignment.status);
            break;
        }

        let Some(assignment_status) = outcome_status else {
            return Ok(ReportOutcome::NoActiveAssignment);
        };

        let writes = vec![DesiredStateWrite::ProjectStatus {
            device_id: report.device_id,
            tenant_id,
            status: report.deployment_status,
        }];
        let events = vec![DomainEvent::DeviceReportedState {
            tenant_id,
            device_id: report.device_id,
            deployment_status: report.deployment_status,
            at: now,
        }];

        let commit = diff_commit(&original, &updated, loaded.version, writes, events);
        self.store.commit(&commit)?;
        Ok(ReportOutcome::Applied {
            rollout_id,
            assignment_status,
        })
    }

    /// Runs one reconcile tick for a rollout.
    ///
    /// The tick sweeps heartbeat deadlines, checks the auto-rollback rule,
    /// raises stall and high-failure-rate signals, and advances the phase
    /// when it is ready. A quiescent tick commits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the store fails. Invariant violations
    /// do not surface as errors: the rollout is failed and a critical
    /// signal is returned instead.
    pub fn reconcile_tick(
        &self,
        rollout_id: RolloutId,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        let status = original.rollout.status;

        // Pending, paused, and terminal rollouts are quiescent by
        // definition.
        if status != RolloutStatus::InProgress {
            return Ok(TickReport {
                rollout_id,
                status,
                changed: false,
                signals: Vec::new(),
            });
        }

        if let Err(violation) = original.check_invariants() {
            return self.fail_on_violation(&original, loaded.version, &violation, now);
        }

        let mut updated = original.clone();
        let mut writes = Vec::new();
        let mut events = Vec::new();
        let mut signals = Vec::new();
        let mut changed = false;

        let tenant_id = updated.rollout.tenant_id;
        let threshold = updated.rollout.failure_threshold;
        let heartbeat = self.config.heartbeat_deadline;
        let stall_after = self.config.stall_alert_after;
        let phase_count = updated.phases.len();

        // One borrow region over the current phase: heartbeat sweep plus
        // the observations the decision logic needs afterwards.
        let (rate, phase_number, failures, all_terminal, soaked, stalled) = {
            let Some(current) = updated.current_phase_mut() else {
                // InProgress with no current phase is corruption.
                return self.fail_on_violation(
                    &original,
                    loaded.version,
                    &InvariantViolation::CurrentPhaseOutOfRange {
                        current: original.rollout.current_phase_number,
                        phases: phase_count,
                    },
                    now,
                );
            };

            // Heartbeat sweep: reconciling devices that went silent are
            // failed.
            for assignment in &mut current.assignments {
                if assignment.status != AssignmentStatus::Reconciling {
                    continue;
                }
                let reference = assignment.last_report_at.or(assignment.assigned_at);
                let silent =
                    reference.is_some_and(|last| now.elapsed_at_least(last, heartbeat));
                if silent {
                    assignment.status = AssignmentStatus::Failed;
                    assignment.retry_count += 1;
                    assignment.reconciled_at = Some(now);
                    assignment.error_message = Some("heartbeat deadline exceeded".to_string());
                    current.phase.failure_count += 1;
                    changed = true;
                }
            }

            let all_terminal =
                current.assignments.iter().all(|assignment| assignment.status.is_terminal());
            let soaked = match current.phase.min_healthy_duration {
                Some(duration) => current
                    .phase
                    .started_at
                    .is_some_and(|started| now.elapsed_at_least(started, duration)),
                None => true,
            };
            let stalled = current
                .phase
                .started_at
                .is_some_and(|started| now.elapsed_at_least(started, stall_after));

            (
                current.phase.failure_rate(),
                current.phase.phase_number,
                current.phase.failure_count,
                all_terminal,
                soaked,
                stalled,
            )
        };

        // The failure rule fires independently of remaining reports.
        if failures > 0 && rate > threshold {
            let mut rollback_events = Vec::new();
            let mut rollback_writes = Vec::new();
            let mut rollback_signals = rollback_transition(
                &mut updated,
                RollbackReason::AutoThresholdBreach,
                now,
                &mut rollback_writes,
                &mut rollback_events,
            );
            signals.append(&mut rollback_signals);
            let commit =
                diff_commit(&original, &updated, loaded.version, rollback_writes, rollback_events);
            self.store.commit(&commit)?;
            return Ok(TickReport {
                rollout_id,
                status: RolloutStatus::RolledBack,
                changed: true,
                signals,
            });
        }

        if failures > 0 && threshold > 0.0 && rate > threshold / 2.0 {
            signals.push(AlertSignal {
                tenant_id,
                alert_type: AlertType::HighFailureRate,
                severity: AlertSeverity::Warning,
                title: format!("High failure rate in phase {phase_number}"),
                description: format!(
                    "Phase {phase_number} failure rate {rate:.3} crossed half the threshold {threshold:.3}"
                ),
                device_id: None,
                rollout_id: Some(rollout_id),
                observed_at: now,
            });
        }

        if stalled {
            signals.push(AlertSignal {
                tenant_id,
                alert_type: AlertType::RolloutStalled,
                severity: AlertSeverity::Warning,
                title: format!("Rollout phase {phase_number} stalled"),
                description: format!(
                    "Phase {phase_number} has been in progress past the stall deadline"
                ),
                device_id: None,
                rollout_id: Some(rollout_id),
                observed_at: now,
            });
        }

        // ReadyToAdvance: every assignment terminal, rate within threshold
        // (the rollback rule above already returned otherwise), and the
        // minimum healthy soak elapsed.
        if all_terminal && soaked {
            complete_current_phase(&mut updated, now, &mut writes, &mut events);
            changed = true;
        }

        if !changed {
            return Ok(TickReport {
                rollout_id,
                status: updated.rollout.status,
                changed: false,
                signals,
            });
        }

        let commit = diff_commit(&original, &updated, loaded.version, writes, events);
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: updated.rollout.status,
            changed: true,
            signals,
        })
    }

    // ========================================================================
    // SECTION: Internal Helpers
    // ========================================================================

    /// Loads a rollout or reports it missing.
    fn load(&self, rollout_id: RolloutId) -> Result<VersionedRollout, ExecutorError> {
        self.store
            .load_rollout(rollout_id)?
            .ok_or(ExecutorError::RolloutNotFound(rollout_id))
    }

    /// Applies a simple status switch guarded by the expected status.
    fn switch_status(
        &self,
        rollout_id: RolloutId,
        expected: RolloutStatus,
        next: RolloutStatus,
        action: &'static str,
        _now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let loaded = self.load(rollout_id)?;
        let original = loaded.aggregate;
        if original.rollout.status != expected {
            return Err(ExecutorError::InvalidTransition {
                rollout_id,
                status: original.rollout.status,
                action,
            });
        }

        let mut updated = original.clone();
        updated.rollout.status = next;
        let commit = diff_commit(&original, &updated, loaded.version, Vec::new(), Vec::new());
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: next,
            changed: true,
            signals: Vec::new(),
        })
    }

    /// Fails a rollout on an invariant violation and raises a critical
    /// signal. There is no automatic recovery from this state.
    fn fail_on_violation(
        &self,
        original: &RolloutAggregate,
        version: StoreVersion,
        violation: &InvariantViolation,
        now: Timestamp,
    ) -> Result<TickReport, ExecutorError> {
        let rollout_id = original.rollout.rollout_id;
        let tenant_id = original.rollout.tenant_id;

        let mut updated = original.clone();
        updated.rollout.status = RolloutStatus::Failed;
        updated.rollout.completed_at = Some(now);
        skip_open_work(&mut updated, now);

        let events = vec![DomainEvent::RolloutFailed {
            rollout_id,
            tenant_id,
            reason: violation.to_string(),
            at: now,
        }];
        let signals = vec![AlertSignal {
            tenant_id,
            alert_type: AlertType::RolloutFailed,
            severity: AlertSeverity::Critical,
            title: "Rollout failed on invariant violation".to_string(),
            description: violation.to_string(),
            device_id: None,
            rollout_id: Some(rollout_id),
            observed_at: now,
        }];

        let commit = diff_commit(original, &updated, version, Vec::new(), events);
        self.store.commit(&commit)?;
        Ok(TickReport {
            rollout_id,
            status: RolloutStatus::Failed,
            changed: true,
            signals,
        })
    }
}

// ============================================================================
// SECTION: Transition Helpers
// ============================================================================

/// Puts a phase in progress and dispatches its devices.
fn begin_phase(
    aggregate: &mut RolloutAggregate,
    phase_number: u32,
    now: Timestamp,
    writes: &mut Vec<DesiredStateWrite>,
    events: &mut Vec<DomainEvent>,
) {
    let rollout_id = aggregate.rollout.rollout_id;
    let tenant_id = aggregate.rollout.tenant_id;
    let bundle_id = aggregate.rollout.bundle_id;
    let target_version = aggregate.rollout.target_version.clone();

    let Some(state) = aggregate.phases.get_mut(phase_number as usize - 1) else {
        return;
    };
    state.phase.status = PhaseStatus::InProgress;
    state.phase.started_at = Some(now);

    for assignment in &mut state.assignments {
        assignment.status = AssignmentStatus::Assigned;
        assignment.assigned_at = Some(now);
        writes.push(DesiredStateWrite::Assign {
            device_id: assignment.device_id,
            tenant_id,
            bundle_id,
            version: target_version.clone(),
            assigned_by: format!("rollout:{rollout_id}"),
            assigned_at: now,
        });
        events.push(DomainEvent::DeviceDesiredStateChanged {
            tenant_id,
            device_id: assignment.device_id,
            bundle_id: Some(bundle_id),
            version: Some(target_version.clone()),
            at: now,
        });
    }
}

/// Completes the current phase and either finishes the rollout or begins
/// the next phase.
fn complete_current_phase(
    aggregate: &mut RolloutAggregate,
    now: Timestamp,
    writes: &mut Vec<DesiredStateWrite>,
    events: &mut Vec<DomainEvent>,
) {
    let rollout_id = aggregate.rollout.rollout_id;
    let tenant_id = aggregate.rollout.tenant_id;
    let phase_count = u32::try_from(aggregate.phases.len()).unwrap_or(u32::MAX);
    let completed_number = aggregate.rollout.current_phase_number;

    if let Some(state) = aggregate.current_phase_mut() {
        state.phase.status = PhaseStatus::Completed;
        state.phase.completed_at = Some(now);
        // Tolerated failures no longer block the phase; their outcome stays
        // in the failure count and error message.
        for assignment in &mut state.assignments {
            if assignment.status == AssignmentStatus::Failed {
                assignment.status = AssignmentStatus::Skipped;
            }
        }
    }

    if completed_number >= phase_count {
        aggregate.rollout.status = RolloutStatus::Completed;
        aggregate.rollout.completed_at = Some(now);
        aggregate.rollout.current_phase_number = phase_count + 1;
        events.push(DomainEvent::RolloutCompleted {
            rollout_id,
            tenant_id,
            at: now,
        });
        return;
    }

    let next_number = completed_number + 1;
    aggregate.rollout.current_phase_number = next_number;
    begin_phase(aggregate, next_number, now, writes, events);
    events.push(DomainEvent::RolloutPhaseAdvanced {
        rollout_id,
        tenant_id,
        from_phase: completed_number,
        to_phase: next_number,
        at: now,
    });
}

/// Applies rollback semantics and returns the alert signals to raise.
fn rollback_transition(
    aggregate: &mut RolloutAggregate,
    reason: RollbackReason,
    now: Timestamp,
    writes: &mut Vec<DesiredStateWrite>,
    events: &mut Vec<DomainEvent>,
) -> Vec<AlertSignal> {
    let rollout_id = aggregate.rollout.rollout_id;
    let tenant_id = aggregate.rollout.tenant_id;
    let bundle_id = aggregate.rollout.bundle_id;
    let previous_version = aggregate.rollout.previous_version.clone();
    let current_number = aggregate.rollout.current_phase_number;

    aggregate.rollout.status = RolloutStatus::RolledBack;
    aggregate.rollout.completed_at = Some(now);

    for state in &mut aggregate.phases {
        let is_current = state.phase.phase_number == current_number;
        if !state.phase.status.is_terminal() {
            state.phase.status =
                if is_current && reason == RollbackReason::AutoThresholdBreach {
                    PhaseStatus::Failed
                } else {
                    PhaseStatus::Skipped
                };
            state.phase.completed_at = Some(now);
        }

        for assignment in &mut state.assignments {
            // Every device that received the target version is reverted.
            if assignment.assigned_at.is_some() {
                match &previous_version {
                    Some(previous) => writes.push(DesiredStateWrite::Assign {
                        device_id: assignment.device_id,
                        tenant_id,
                        bundle_id,
                        version: previous.clone(),
                        assigned_by: format!("rollback:{rollout_id}"),
                        assigned_at: now,
                    }),
                    None => writes.push(DesiredStateWrite::Clear {
                        device_id: assignment.device_id,
                        tenant_id,
                    }),
                }
                events.push(DomainEvent::DeviceDesiredStateChanged {
                    tenant_id,
                    device_id: assignment.device_id,
                    bundle_id: previous_version.as_ref().map(|_| bundle_id),
                    version: previous_version.clone(),
                    at: now,
                });
            }
            if !assignment.status.is_terminal() {
                assignment.status = AssignmentStatus::Skipped;
                assignment.reconciled_at = Some(now);
            }
        }
    }

    events.push(DomainEvent::RolloutRolledBack {
        rollout_id,
        tenant_id,
        reason,
        at: now,
    });

    vec![AlertSignal {
        tenant_id,
        alert_type: AlertType::RolloutFailed,
        severity: AlertSeverity::Critical,
        title: "Rollout rolled back".to_string(),
        description: format!("Rollout {rollout_id} rolled back ({reason:?})"),
        device_id: None,
        rollout_id: Some(rollout_id),
        observed_at: now,
    }]
}

/// Skips all non-terminal phases and assignments.
fn skip_open_work(aggregate: &mut RolloutAggregate, now: Timestamp) {
    for state in &mut aggregate.phases {
        if !state.phase.status.is_terminal() {
            state.phase.status = PhaseStatus::Skipped;
            state.phase.completed_at = Some(now);
        }
        for assignment in &mut state.assignments {
            if !assignment.status.is_terminal() {
                assignment.status = AssignmentStatus::Skipped;
                assignment.reconciled_at = Some(now);
            }
        }
    }
}

/// Builds a commit from the rows that differ between two aggregates.
fn diff_commit(
    original: &RolloutAggregate,
    updated: &RolloutAggregate,
    expected_version: StoreVersion,
    desired_writes: Vec<DesiredStateWrite>,
    events: Vec<DomainEvent>,
) -> RolloutCommit {
    let mut phases = Vec::new();
    let mut assignments = Vec::new();

    for (index, state) in updated.phases.iter().enumerate() {
        let before = original.phases.get(index);
        if before.is_none_or(|prior| prior.phase != state.phase) {
            phases.push(state.phase.clone());
        }
        for (slot, assignment) in state.assignments.iter().enumerate() {
            let prior = before.and_then(|prior| prior.assignments.get(slot));
            if prior.is_none_or(|prior| prior != assignment) {
                assignments.push(assignment.clone());
            }
        }
    }

    RolloutCommit {
        rollout_id: updated.rollout.rollout_id,
        expected_version,
        rollout: updated.rollout.clone(),
        phases,
        assignments,
        desired_writes,
        events,
    }
}
