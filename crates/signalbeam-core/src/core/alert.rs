// signalbeam-core/src/core/alert.rs
// ============================================================================
// Module: SignalBeam Alerts
// Description: Rollout-facing alert records and signals.
// Purpose: Define the deduplicated alert model consumed by the notification
// side.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Alerts are produced from rollout signals. For every
//! `(tenant, type, device?, rollout?)` key at most one `Active` alert
//! exists; duplicate signals refresh `last_seen_at` instead of raising a
//! second alert. `Resolved` is terminal; a later signal with the same key
//! opens a fresh alert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AlertId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::RolloutId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Alert Enums
// ============================================================================

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate attention.
    Critical,
}

/// Rollout-facing alert types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// A rollout was rolled back or failed fatally.
    RolloutFailed,
    /// A phase stayed in progress past the stall deadline.
    RolloutStalled,
    /// A phase's failure rate crossed half the threshold.
    HighFailureRate,
}

/// Alert lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    /// Raised and unhandled.
    Active,
    /// Acknowledged by an operator.
    Acknowledged,
    /// Resolved; terminal.
    Resolved,
}

// ============================================================================
// SECTION: Alert Record
// ============================================================================

/// A structured alert record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier.
    pub alert_id: AlertId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Severity.
    pub severity: AlertSeverity,
    /// Alert type, part of the deduplication key.
    pub alert_type: AlertType,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Related device, when device-scoped.
    pub device_id: Option<DeviceId>,
    /// Related rollout, when rollout-scoped.
    pub rollout_id: Option<RolloutId>,
    /// When the alert was first raised.
    pub created_at: Timestamp,
    /// When the underlying signal was last observed.
    pub last_seen_at: Timestamp,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// Operator who acknowledged the alert.
    pub acknowledged_by: Option<String>,
    /// When the alert was acknowledged.
    pub acknowledged_at: Option<Timestamp>,
    /// When the alert was resolved.
    pub resolved_at: Option<Timestamp>,
}

impl Alert {
    /// Returns the deduplication key of this alert.
    #[must_use]
    pub const fn key(&self) -> AlertKey {
        AlertKey {
            tenant_id: self.tenant_id,
            alert_type: self.alert_type,
            device_id: self.device_id,
            rollout_id: self.rollout_id,
        }
    }
}

/// Deduplication key: at most one `Active` alert exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Alert type.
    pub alert_type: AlertType,
    /// Related device, when device-scoped.
    pub device_id: Option<DeviceId>,
    /// Related rollout, when rollout-scoped.
    pub rollout_id: Option<RolloutId>,
}

// ============================================================================
// SECTION: Alert Signals
// ============================================================================

/// A rollout-produced signal consumed by the alert engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSignal {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Alert type to raise or refresh.
    pub alert_type: AlertType,
    /// Severity of the signal.
    pub severity: AlertSeverity,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Related device, when device-scoped.
    pub device_id: Option<DeviceId>,
    /// Related rollout, when rollout-scoped.
    pub rollout_id: Option<RolloutId>,
    /// When the signal was observed.
    pub observed_at: Timestamp,
}

impl AlertSignal {
    /// Returns the deduplication key of this signal.
    #[must_use]
    pub const fn key(&self) -> AlertKey {
        AlertKey {
            tenant_id: self.tenant_id,
            alert_type: self.alert_type,
            device_id: self.device_id,
            rollout_id: self.rollout_id,
        }
    }
}
