// signalbeam-core/src/core/device.rs
// ============================================================================
// Module: SignalBeam Devices
// Description: Device directory records and agent report ingestion types.
// Purpose: Define the device view the rollout core consumes and the report
// document the edge agent submits.
// Dependencies: crate::core::{identifiers, time, version}, serde, tag-logic
// ============================================================================

//! ## Overview
//! Devices are owned by an external registry; the rollout core sees a
//! read-only projection: identifier, tenant, normalized tag set, optional
//! group, and the last reported deployment status. Agent reports arrive on
//! the ingress surface as camelCase JSON documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tag_logic::TagSet;

use crate::core::identifiers::BundleId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::version::SemverVersion;

// ============================================================================
// SECTION: Deployment Status
// ============================================================================

/// Deployment status reported by the edge agent for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// No reconciliation has started for the current desired state.
    Pending,
    /// The agent is converging on the desired state.
    Reconciling,
    /// The device runs the desired bundle version.
    Succeeded,
    /// Reconciliation failed.
    Failed,
}

// ============================================================================
// SECTION: Device Record
// ============================================================================

/// Read-only device projection consumed by the rollout core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Normalized tag set (invalid stored tags already skipped).
    pub tags: TagSet,
    /// Optional static group membership.
    pub group_id: Option<GroupId>,
    /// Bundle currently assigned via the desired-state index, if any.
    pub assigned_bundle_id: Option<BundleId>,
    /// Last reported deployment status.
    pub deployment_status: DeploymentStatus,
}

// ============================================================================
// SECTION: Agent Reports
// ============================================================================

/// One container's state as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedContainer {
    /// Container name.
    pub name: String,
    /// Image reference the container runs.
    pub image: String,
    /// Free-form container state (`running`, `stopped`, ...).
    pub state: String,
}

/// Agent report document submitted on the ingress surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    /// Reporting device.
    pub device_id: DeviceId,
    /// Report timestamp from the agent's clock.
    pub timestamp: Timestamp,
    /// Bundle currently running, if any.
    pub current_bundle_id: Option<BundleId>,
    /// Version currently running, if any.
    pub current_version: Option<SemverVersion>,
    /// Deployment status relative to the desired state.
    pub deployment_status: DeploymentStatus,
    /// Error detail when reconciliation failed.
    pub reconciliation_error: Option<String>,
    /// Per-container states.
    #[serde(default)]
    pub containers: Vec<ReportedContainer>,
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================
