// signalbeam-core/src/core/events.rs
// ============================================================================
// Module: SignalBeam Domain Events
// Description: Bus events emitted through the transactional outbox.
// Purpose: Define the event payloads and their per-subject routing keys.
// Dependencies: crate::core::{alert, device, identifiers, rollout, time,
// version}, serde
// ============================================================================

//! ## Overview
//! Domain events are written as outbox rows in the same transaction as the
//! state change that produced them and relayed to the bus at-least-once.
//! Consumers must tolerate duplicates; the alert engine deduplicates.
//! Events for one rollout are delivered in emission order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::alert::AlertSeverity;
use crate::core::alert::AlertType;
use crate::core::device::DeploymentStatus;
use crate::core::identifiers::AlertId;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::RolloutId;
use crate::core::identifiers::TenantId;
use crate::core::rollout::RollbackReason;
use crate::core::time::Timestamp;
use crate::core::version::SemverVersion;

// ============================================================================
// SECTION: Domain Events
// ============================================================================

/// Events published on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A rollout was created and materialized.
    RolloutCreated {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Bundle being rolled out.
        bundle_id: BundleId,
        /// Target version.
        target_version: SemverVersion,
        /// Size of the frozen target set.
        device_count: u64,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A rollout entered `InProgress`.
    RolloutStarted {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A rollout advanced to its next phase.
    RolloutPhaseAdvanced {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Completed phase number.
        from_phase: u32,
        /// Newly started phase number.
        to_phase: u32,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A rollout completed successfully.
    RolloutCompleted {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A rollout was rolled back.
    RolloutRolledBack {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Rollback reason.
        reason: RollbackReason,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A rollout failed (cancelled or fatal error).
    RolloutFailed {
        /// Rollout identifier.
        rollout_id: RolloutId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Failure reason description.
        reason: String,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A device's desired state changed.
    DeviceDesiredStateChanged {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Target device.
        device_id: DeviceId,
        /// New bundle, or `None` when cleared.
        bundle_id: Option<BundleId>,
        /// New version, or `None` when cleared.
        version: Option<SemverVersion>,
        /// Event timestamp.
        at: Timestamp,
    },
    /// A device submitted an agent report.
    DeviceReportedState {
        /// Owning tenant.
        tenant_id: TenantId,
        /// Reporting device.
        device_id: DeviceId,
        /// Reported deployment status.
        deployment_status: DeploymentStatus,
        /// Event timestamp.
        at: Timestamp,
    },
    /// An alert was raised.
    AlertRaised {
        /// Alert identifier.
        alert_id: AlertId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Alert type.
        alert_type: AlertType,
        /// Alert severity.
        severity: AlertSeverity,
        /// Event timestamp.
        at: Timestamp,
    },
    /// An alert was acknowledged.
    AlertAcknowledged {
        /// Alert identifier.
        alert_id: AlertId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Event timestamp.
        at: Timestamp,
    },
    /// An alert was resolved.
    AlertResolved {
        /// Alert identifier.
        alert_id: AlertId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Event timestamp.
        at: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the bus subject this event publishes on.
    #[must_use]
    pub const fn subject(&self) -> &'static str {
        match self {
            Self::RolloutCreated {
                ..
            } => "rollout.created",
            Self::RolloutStarted {
                ..
            } => "rollout.started",
            Self::RolloutPhaseAdvanced {
                ..
            } => "rollout.phase-advanced",
            Self::RolloutCompleted {
                ..
            } => "rollout.completed",
            Self::RolloutRolledBack {
                ..
            } => "rollout.rolled-back",
            Self::RolloutFailed {
                ..
            } => "rollout.failed",
            Self::DeviceDesiredStateChanged {
                ..
            } => "device.desired-state-changed",
            Self::DeviceReportedState {
                ..
            } => "device.reported-state",
            Self::AlertRaised {
                ..
            } => "alert.raised",
            Self::AlertAcknowledged {
                ..
            } => "alert.acknowledged",
            Self::AlertResolved {
                ..
            } => "alert.resolved",
        }
    }
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================
