// signalbeam-core/src/runtime/planner.rs
// ============================================================================
// Module: SignalBeam Rollout Planner
// Description: Validation and deterministic materialization of rollouts.
// Purpose: Turn a create request into a persisted rollout with phases and
// device assignments.
// Dependencies: crate::{core, interfaces, runtime::selector}, thiserror
// ============================================================================

//! ## Overview
//! The planner validates a request, expands its target selector into a
//! lexicographically ordered device list, slices that list into phases on
//! cumulative `ceil` boundaries, and persists the whole aggregate
//! atomically. Materialization is deterministic: identical inputs always
//! produce identical phases and assignments, down to the derived
//! identifiers. The target set is frozen here; devices that match a
//! dynamic selector later are only picked up by future rollouts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AssignmentId;
use crate::core::BundleId;
use crate::core::Classify;
use crate::core::DeviceId;
use crate::core::DomainEvent;
use crate::core::DurationMillis;
use crate::core::ErrorClass;
use crate::core::PhaseId;
use crate::core::RolloutAggregate;
use crate::core::RolloutId;
use crate::core::SemverVersion;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::VersionError;
use crate::core::VersionStatus;
use crate::core::rollout::AssignmentRecord;
use crate::core::rollout::AssignmentStatus;
use crate::core::rollout::DEFAULT_FAILURE_THRESHOLD;
use crate::core::rollout::MAX_PHASES;
use crate::core::rollout::PhaseState;
use crate::core::rollout::PhaseStatus;
use crate::core::rollout::RolloutPhaseRecord;
use crate::core::rollout::RolloutRecord;
use crate::core::rollout::RolloutStatus;
use crate::interfaces::BundleCatalog;
use crate::interfaces::CatalogError;
use crate::interfaces::DeviceDirectory;
use crate::interfaces::RolloutStore;
use crate::interfaces::StoreError;
use crate::runtime::selector::SelectorError;
use crate::runtime::selector::TargetSelector;
use crate::runtime::selector::expand_selector;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// One phase of a create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    /// Human-readable phase name.
    pub name: String,
    /// Cumulative percentage of the target set, in `(0, 100]`.
    pub target_percentage: f64,
    /// Minimum healthy soak time before advancement.
    pub min_healthy_duration: Option<DurationMillis>,
}

/// Request to create a phased rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRolloutRequest {
    /// Rollout identifier minted by the caller.
    pub rollout_id: RolloutId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Bundle to roll out.
    pub bundle_id: BundleId,
    /// Target version string, validated here.
    pub target_version: String,
    /// Version restored on rollback, when known.
    pub previous_version: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Operator creating the rollout.
    pub created_by: String,
    /// Target device selection.
    pub selector: TargetSelector,
    /// Phase plan, 1 to 10 entries with strictly increasing percentages
    /// ending at 100.
    pub phases: Vec<PhasePlan>,
    /// Failure threshold override, in `[0, 1]`.
    pub failure_threshold: Option<f64>,
}

/// Planner configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    /// Threshold applied when a request omits one.
    pub default_failure_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

// ============================================================================
// SECTION: Plan Errors
// ============================================================================

/// Errors produced while planning a rollout.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The target or previous version string was malformed.
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),
    /// The target version does not exist in the catalog.
    #[error("bundle {bundle_id} has no version {version}")]
    VersionNotFound {
        /// Bundle looked up.
        bundle_id: BundleId,
        /// Missing version.
        version: SemverVersion,
    },
    /// The target version exists but is not published.
    #[error("version {version} is {status:?}, not published")]
    VersionNotPublished {
        /// Target version.
        version: SemverVersion,
        /// Its current status.
        status: VersionStatus,
    },
    /// The request had no phases.
    #[error("rollout has no phases")]
    NoPhases,
    /// The request exceeded the phase limit.
    #[error("rollout has {count} phases; at most {MAX_PHASES} are allowed")]
    TooManyPhases {
        /// Requested phase count.
        count: usize,
    },
    /// A percentage was outside `(0, 100]`.
    #[error("phase {phase_number} percentage {value} is outside (0, 100]")]
    PercentageOutOfRange {
        /// 1-based phase number.
        phase_number: u32,
        /// Offending value.
        value: f64,
    },
    /// Percentages were not strictly increasing.
    #[error("phase {phase_number} percentage does not increase")]
    NonMonotonicPercentages {
        /// 1-based phase number.
        phase_number: u32,
    },
    /// The final phase did not reach 100 percent.
    #[error("final phase percentage {value} must be 100")]
    FinalPhaseNotComplete {
        /// Final percentage supplied.
        value: f64,
    },
    /// The failure threshold was outside `[0, 1]`.
    #[error("failure threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange {
        /// Offending value.
        value: f64,
    },
    /// Selector expansion produced no devices.
    #[error("target selector matched no devices")]
    EmptyTargetSet,
    /// Devices already participate in another rollout.
    #[error("{} device(s) already participate in another rollout", devices.len())]
    DevicesBusy {
        /// Conflicting devices.
        devices: Vec<DeviceId>,
    },
    /// Selector expansion failed.
    #[error(transparent)]
    Selector(#[from] SelectorError),
    /// Bundle catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Rollout store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for PlanError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidVersion(_)
            | Self::NoPhases
            | Self::TooManyPhases {
                ..
            }
            | Self::PercentageOutOfRange {
                ..
            }
            | Self::NonMonotonicPercentages {
                ..
            }
            | Self::FinalPhaseNotComplete {
                ..
            }
            | Self::ThresholdOutOfRange {
                ..
            }
            | Self::VersionNotPublished {
                ..
            }
            | Self::EmptyTargetSet => ErrorClass::Validation,
            Self::VersionNotFound {
                ..
            } => ErrorClass::NotFound,
            Self::DevicesBusy {
                ..
            } => ErrorClass::Conflict,
            Self::Selector(err) => err.class(),
            Self::Catalog(err) => err.class(),
            Self::Store(err) => err.class(),
        }
    }
}

// ============================================================================
// SECTION: Planner
// ============================================================================

/// Rollout planner over a store, a bundle catalog, and a device directory.
pub struct RolloutPlanner<S, C, D> {
    /// Rollout store.
    store: S,
    /// Bundle catalog.
    catalog: C,
    /// Device directory.
    directory: D,
    /// Planner configuration.
    config: PlannerConfig,
}

impl<S, C, D> RolloutPlanner<S, C, D>
where
    S: RolloutStore,
    C: BundleCatalog,
    D: DeviceDirectory,
{
    /// Creates a planner.
    pub const fn new(store: S, catalog: C, directory: D, config: PlannerConfig) -> Self {
        Self {
            store,
            catalog,
            directory,
            config,
        }
    }

    /// Validates and materializes a rollout, persisting it atomically.
    ///
    /// The rollout is created in `Pending`; starting it is a separate
    /// executor operation.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] on invalid input, unknown versions, an empty
    /// target set, device conflicts, or store failure.
    pub fn plan(
        &self,
        request: &CreateRolloutRequest,
        now: Timestamp,
    ) -> Result<RolloutAggregate, PlanError> {
        let target_version = SemverVersion::parse(request.target_version.clone())?;
        let previous_version = match &request.previous_version {
            Some(raw) => Some(SemverVersion::parse(raw.clone())?),
            None => None,
        };

        let record = self
            .catalog
            .version(request.bundle_id, &target_version)?
            .ok_or_else(|| PlanError::VersionNotFound {
                bundle_id: request.bundle_id,
                version: target_version.clone(),
            })?;
        if record.status != VersionStatus::Published {
            return Err(PlanError::VersionNotPublished {
                version: target_version,
                status: record.status,
            });
        }
        if let Some(previous) = &previous_version {
            self.catalog.version(request.bundle_id, previous)?.ok_or_else(|| {
                PlanError::VersionNotFound {
                    bundle_id: request.bundle_id,
                    version: previous.clone(),
                }
            })?;
        }

        validate_phases(&request.phases)?;
        let failure_threshold =
            request.failure_threshold.unwrap_or(self.config.default_failure_threshold);
        if !(0.0..=1.0).contains(&failure_threshold) {
            return Err(PlanError::ThresholdOutOfRange {
                value: failure_threshold,
            });
        }

        let devices = expand_selector(&self.directory, request.tenant_id, &request.selector)?;
        if devices.is_empty() {
            return Err(PlanError::EmptyTargetSet);
        }

        let busy = self.store.active_device_ids(request.tenant_id)?;
        let conflicting: Vec<DeviceId> =
            devices.iter().copied().filter(|device| busy.contains(device)).collect();
        if !conflicting.is_empty() {
            return Err(PlanError::DevicesBusy {
                devices: conflicting,
            });
        }

        let aggregate = materialize(request, target_version, previous_version, &devices, failure_threshold, now);

        let created = DomainEvent::RolloutCreated {
            rollout_id: request.rollout_id,
            tenant_id: request.tenant_id,
            bundle_id: request.bundle_id,
            target_version: aggregate.rollout.target_version.clone(),
            device_count: u64::try_from(devices.len()).unwrap_or(u64::MAX),
            at: now,
        };
        self.store.insert_rollout(&aggregate, &[created])?;

        Ok(aggregate)
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates phase count, percentage ranges, and monotonicity.
fn validate_phases(phases: &[PhasePlan]) -> Result<(), PlanError> {
    if phases.is_empty() {
        return Err(PlanError::NoPhases);
    }
    if phases.len() > MAX_PHASES {
        return Err(PlanError::TooManyPhases {
            count: phases.len(),
        });
    }

    let mut previous = 0.0_f64;
    for (index, phase) in phases.iter().enumerate() {
        let phase_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let value = phase.target_percentage;
        if !value.is_finite() || value <= 0.0 || value > 100.0 {
            return Err(PlanError::PercentageOutOfRange {
                phase_number,
                value,
            });
        }
        if value <= previous {
            return Err(PlanError::NonMonotonicPercentages {
                phase_number,
            });
        }
        previous = value;
    }

    let last = previous;
    if (last - 100.0).abs() > f64::EPSILON {
        return Err(PlanError::FinalPhaseNotComplete {
            value: last,
        });
    }

    Ok(())
}

// ============================================================================
// SECTION: Materialization
// ============================================================================

/// Computes the cumulative device boundary for one phase.
///
/// `ceil` on cumulative boundaries guarantees the final phase lands exactly
/// on the full target set.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "Device counts are far below 2^52; the ceil result is clamped to the total."
)]
fn cumulative_boundary(total: usize, percentage: f64) -> usize {
    let raw = (total as f64 * percentage / 100.0).ceil() as usize;
    raw.min(total)
}

/// Materializes the aggregate: slices the device list into phases and
/// derives phase and assignment identifiers.
fn materialize(
    request: &CreateRolloutRequest,
    target_version: SemverVersion,
    previous_version: Option<SemverVersion>,
    devices: &[DeviceId],
    failure_threshold: f64,
    now: Timestamp,
) -> RolloutAggregate {
    let total = devices.len();
    let mut phases = Vec::with_capacity(request.phases.len());
    let mut start = 0usize;

    for (index, plan) in request.phases.iter().enumerate() {
        let phase_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let boundary = cumulative_boundary(total, plan.target_percentage).max(start);
        let slice = &devices[start..boundary];
        let phase_id = PhaseId::derive(request.rollout_id, phase_number);

        let assignments = slice
            .iter()
            .map(|device_id| AssignmentRecord {
                assignment_id: AssignmentId::derive(request.rollout_id, *device_id),
                rollout_id: request.rollout_id,
                phase_id,
                device_id: *device_id,
                status: AssignmentStatus::Pending,
                assigned_at: None,
                reconciled_at: None,
                last_report_at: None,
                error_message: None,
                retry_count: 0,
            })
            .collect();

        phases.push(PhaseState {
            phase: RolloutPhaseRecord {
                phase_id,
                rollout_id: request.rollout_id,
                phase_number,
                name: plan.name.clone(),
                target_device_count: u32::try_from(slice.len()).unwrap_or(u32::MAX),
                target_percentage: Some(plan.target_percentage),
                status: PhaseStatus::Pending,
                started_at: None,
                completed_at: None,
                success_count: 0,
                failure_count: 0,
                min_healthy_duration: plan.min_healthy_duration,
            },
            assignments,
        });

        start = boundary;
    }

    RolloutAggregate {
        rollout: RolloutRecord {
            rollout_id: request.rollout_id,
            tenant_id: request.tenant_id,
            bundle_id: request.bundle_id,
            target_version,
            previous_version,
            status: RolloutStatus::Pending,
            name: request.name.clone(),
            description: request.description.clone(),
            created_by: request.created_by.clone(),
            created_at: now,
            started_at: None,
            completed_at: None,
            failure_threshold,
            current_phase_number: 0,
        },
        phases,
    }
}
