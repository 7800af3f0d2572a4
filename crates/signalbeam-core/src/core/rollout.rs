// signalbeam-core/src/core/rollout.rs
// ============================================================================
// Module: SignalBeam Rollouts
// Description: Rollout aggregate, phases, and device assignments.
// Purpose: Capture the phased rollout state machine's records and the
// invariants the executor enforces at every tick boundary.
// Dependencies: crate::core::{identifiers, time, version}, serde, thiserror
// ============================================================================

//! ## Overview
//! A rollout is the central aggregate: one record, an ordered list of
//! phases, and one assignment per target device. Phases reference their
//! rollout by identifier, assignments reference phase and rollout by
//! identifier; everything is loaded and stored as rows. Terminal statuses
//! are sticky.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::AssignmentId;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::PhaseId;
use crate::core::identifiers::RolloutId;
use crate::core::identifiers::TenantId;
use crate::core::time::DurationMillis;
use crate::core::time::Timestamp;
use crate::core::version::SemverVersion;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of phases in one rollout.
pub const MAX_PHASES: usize = 10;

/// Default failure threshold applied when a request omits one.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.05;

// ============================================================================
// SECTION: Status Enums
// ============================================================================

/// Rollout lifecycle status.
///
/// # Invariants
/// - `Completed`, `RolledBack`, and `Failed` are terminal and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutStatus {
    /// Created but not yet started.
    Pending,
    /// Actively advancing through phases.
    InProgress,
    /// Paused by an operator; per-device progress continues.
    Paused,
    /// All phases completed within the failure threshold.
    Completed,
    /// Rolled back manually or by threshold breach.
    RolledBack,
    /// Cancelled or failed on a fatal error.
    Failed,
}

impl RolloutStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack | Self::Failed)
    }
}

/// Phase lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    /// Not yet reached.
    Pending,
    /// Currently advancing.
    InProgress,
    /// Completed within the failure threshold.
    Completed,
    /// Breached the failure threshold.
    Failed,
    /// Skipped by rollback or cancellation.
    Skipped,
}

impl PhaseStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Per-device assignment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    /// Materialized, waiting for its phase to start.
    Pending,
    /// Desired state written; awaiting agent acknowledgement.
    Assigned,
    /// The device acknowledged and is converging.
    Reconciling,
    /// The device runs the target version.
    Succeeded,
    /// Reconciliation failed.
    Failed,
    /// Skipped by rollback or cancellation.
    Skipped,
}

impl AssignmentStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Reason a rollout was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    /// Operator-initiated rollback.
    Manual,
    /// Automatic rollback on failure-threshold breach.
    AutoThresholdBreach,
    /// Rollback issued while cancelling dependent work.
    Cancelled,
}

// ============================================================================
// SECTION: Rollout Records
// ============================================================================

/// The rollout row.
///
/// # Invariants
/// - `failure_threshold` lies in `[0.0, 1.0]` and is immutable once the
///   status leaves `Pending`.
/// - `current_phase_number` is 0 before start, the 1-based active phase
///   while running, and `phase count + 1` after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecord {
    /// Rollout identifier.
    pub rollout_id: RolloutId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Bundle being rolled out.
    pub bundle_id: BundleId,
    /// Version the fleet converges to.
    pub target_version: SemverVersion,
    /// Version restored on rollback, when known.
    pub previous_version: Option<SemverVersion>,
    /// Lifecycle status.
    pub status: RolloutStatus,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Operator who created the rollout.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Start timestamp, once started.
    pub started_at: Option<Timestamp>,
    /// Completion timestamp, once terminal.
    pub completed_at: Option<Timestamp>,
    /// Maximum tolerated failure fraction per phase.
    pub failure_threshold: f64,
    /// 1-based active phase number; see invariants.
    pub current_phase_number: u32,
}

/// One phase row of a rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPhaseRecord {
    /// Phase identifier.
    pub phase_id: PhaseId,
    /// Owning rollout.
    pub rollout_id: RolloutId,
    /// 1-based position in the advancement order.
    pub phase_number: u32,
    /// Human-readable name.
    pub name: String,
    /// Number of devices assigned to this phase.
    pub target_device_count: u32,
    /// Cumulative percentage of the target set at this phase.
    pub target_percentage: Option<f64>,
    /// Lifecycle status.
    pub status: PhaseStatus,
    /// When the phase entered `InProgress`.
    pub started_at: Option<Timestamp>,
    /// When the phase reached a terminal status.
    pub completed_at: Option<Timestamp>,
    /// Count of assignments that succeeded.
    pub success_count: u32,
    /// Count of assignments that terminally failed.
    pub failure_count: u32,
    /// Minimum healthy soak time before advancement.
    pub min_healthy_duration: Option<DurationMillis>,
}

impl RolloutPhaseRecord {
    /// Returns the cumulative failure rate observed for this phase.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let reported = self.success_count + self.failure_count;
        f64::from(self.failure_count) / f64::from(reported.max(1))
    }
}

/// One device assignment row.
///
/// # Invariants
/// - `(rollout_id, device_id)` is unique; a device participates in at most
///   one rollout at a time per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Assignment identifier.
    pub assignment_id: AssignmentId,
    /// Owning rollout.
    pub rollout_id: RolloutId,
    /// Owning phase.
    pub phase_id: PhaseId,
    /// Target device.
    pub device_id: DeviceId,
    /// Lifecycle status.
    pub status: AssignmentStatus,
    /// When the desired state was written for this device.
    pub assigned_at: Option<Timestamp>,
    /// When the assignment reached a terminal status.
    pub reconciled_at: Option<Timestamp>,
    /// Most recent agent report observed while the assignment was live.
    pub last_report_at: Option<Timestamp>,
    /// Error detail from the last failure.
    pub error_message: Option<String>,
    /// Count of failed attempts; a retry increments it as well.
    pub retry_count: u32,
}

// ============================================================================
// SECTION: Aggregate
// ============================================================================

/// One phase with its assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Phase row.
    pub phase: RolloutPhaseRecord,
    /// Assignment rows for this phase.
    pub assignments: Vec<AssignmentRecord>,
}

/// A rollout with all of its phases and assignments.
///
/// # Invariants
/// - `phases` is ordered by ascending `phase_number`, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutAggregate {
    /// Rollout row.
    pub rollout: RolloutRecord,
    /// Phases ordered by `phase_number`.
    pub phases: Vec<PhaseState>,
}

impl RolloutAggregate {
    /// Returns the active phase, when one is in range.
    #[must_use]
    pub fn current_phase(&self) -> Option<&PhaseState> {
        let number = self.rollout.current_phase_number;
        if number == 0 {
            return None;
        }
        self.phases.get(number as usize - 1)
    }

    /// Returns the active phase mutably, when one is in range.
    pub fn current_phase_mut(&mut self) -> Option<&mut PhaseState> {
        let number = self.rollout.current_phase_number;
        if number == 0 {
            return None;
        }
        self.phases.get_mut(number as usize - 1)
    }

    /// Returns the total number of materialized device assignments.
    #[must_use]
    pub fn assignment_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.assignments.len()).sum()
    }

    /// Checks the structural invariants the executor relies on.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] when the aggregate is corrupted.
    /// Violations are fatal: the rollout is failed and never auto-recovered.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let phase_count = self.phases.len();
        let current = self.rollout.current_phase_number as usize;
        if current > phase_count + 1 {
            return Err(InvariantViolation::CurrentPhaseOutOfRange {
                current: self.rollout.current_phase_number,
                phases: phase_count,
            });
        }

        let mut devices = BTreeSet::new();
        let mut in_progress = 0usize;
        for (index, state) in self.phases.iter().enumerate() {
            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if state.phase.phase_number != expected {
                return Err(InvariantViolation::PhaseOrderBroken {
                    expected,
                    actual: state.phase.phase_number,
                });
            }

            if state.phase.status == PhaseStatus::InProgress {
                in_progress += 1;
            }

            let target = state.phase.target_device_count;
            if state.assignments.len() != target as usize {
                return Err(InvariantViolation::AssignmentCountMismatch {
                    phase_number: state.phase.phase_number,
                    target,
                    actual: state.assignments.len(),
                });
            }

            let reported = state.phase.success_count + state.phase.failure_count;
            if reported > target {
                return Err(InvariantViolation::CountsExceedTarget {
                    phase_number: state.phase.phase_number,
                    reported,
                    target,
                });
            }

            if state.phase.status == PhaseStatus::Completed {
                let open = state.assignments.iter().any(|assignment| {
                    !matches!(
                        assignment.status,
                        AssignmentStatus::Succeeded | AssignmentStatus::Skipped
                    )
                });
                if open {
                    return Err(InvariantViolation::CompletedPhaseWithOpenAssignment {
                        phase_number: state.phase.phase_number,
                    });
                }
            }

            for assignment in &state.assignments {
                if !devices.insert(assignment.device_id) {
                    return Err(InvariantViolation::DuplicateDevice {
                        device_id: assignment.device_id,
                    });
                }
            }
        }

        if in_progress > 1 {
            return Err(InvariantViolation::MultiplePhasesInProgress {
                count: in_progress,
            });
        }

        Ok(())
    }
}

// ============================================================================
// SECTION: Invariant Violations
// ============================================================================

/// Structural invariant violations detected on a rollout aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// `current_phase_number` points past the phase list.
    #[error("current phase {current} out of range for {phases} phases")]
    CurrentPhaseOutOfRange {
        /// Stored current phase number.
        current: u32,
        /// Number of phases.
        phases: usize,
    },
    /// Phase numbers are not a contiguous ascending sequence.
    #[error("phase order broken: expected {expected}, found {actual}")]
    PhaseOrderBroken {
        /// Expected phase number at this position.
        expected: u32,
        /// Actual phase number found.
        actual: u32,
    },
    /// More than one phase is `InProgress`.
    #[error("{count} phases are in progress; at most one is allowed")]
    MultiplePhasesInProgress {
        /// Number of in-progress phases.
        count: usize,
    },
    /// A completed phase still holds an open assignment.
    #[error("phase {phase_number} is completed but holds an open assignment")]
    CompletedPhaseWithOpenAssignment {
        /// Offending phase number.
        phase_number: u32,
    },
    /// Success and failure counts exceed the phase target.
    #[error("phase {phase_number} reports {reported} outcomes for {target} devices")]
    CountsExceedTarget {
        /// Offending phase number.
        phase_number: u32,
        /// Reported outcome count.
        reported: u32,
        /// Target device count.
        target: u32,
    },
    /// A phase's assignment rows do not match its target count.
    #[error("phase {phase_number} has {actual} assignments for target {target}")]
    AssignmentCountMismatch {
        /// Offending phase number.
        phase_number: u32,
        /// Target device count.
        target: u32,
        /// Actual assignment rows.
        actual: usize,
    },
    /// A device appears in more than one assignment.
    #[error("device {device_id} appears in multiple assignments")]
    DuplicateDevice {
        /// Duplicated device.
        device_id: DeviceId,
    },
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================
