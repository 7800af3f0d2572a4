// signalbeam-core/src/core/state_index.rs
// ============================================================================
// Module: SignalBeam Desired-State Index
// Description: Per-device desired state records and agent wire documents.
// Purpose: Define the authoritative "what should this device run" record
// and the read-only documents the edge agent pulls.
// Dependencies: crate::core::{bundle, device, identifiers, time, version},
// serde, serde_json
// ============================================================================

//! ## Overview
//! The index holds one record per `(tenant, device)`. Writes are idempotent
//! on equal `(bundle_id, version)`; a new value replaces the prior record.
//! The agent sees only a read-only document: the desired version plus the
//! manifest location, or an explicit null telling it to stop all
//! containers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::bundle::BundleVersionRecord;
use crate::core::device::DeploymentStatus;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::version::Checksum;
use crate::core::version::SemverVersion;

// ============================================================================
// SECTION: Desired State Record
// ============================================================================

/// Authoritative desired-state record for one device.
///
/// # Invariants
/// - At most one record exists per `(tenant_id, device_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDesiredState {
    /// Target device.
    pub device_id: DeviceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Bundle the device should run.
    pub bundle_id: BundleId,
    /// Version the device should run.
    pub bundle_version: SemverVersion,
    /// When this value was assigned.
    pub assigned_at: Timestamp,
    /// Who or what assigned it (operator name or rollout identifier).
    pub assigned_by: String,
    /// Deployment status projected from agent reports.
    pub deployment_status: DeploymentStatus,
}

// ============================================================================
// SECTION: Index Writes
// ============================================================================

/// A write applied to the desired-state index.
///
/// Rollout-driven writes travel inside a rollout commit so they land in the
/// same transaction as the state transition that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesiredStateWrite {
    /// Assign a bundle version to a device. A no-op when the device already
    /// holds the same `(bundle_id, version)`.
    Assign {
        /// Target device.
        device_id: DeviceId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Bundle to run.
        bundle_id: BundleId,
        /// Version to run.
        version: SemverVersion,
        /// Assignment attribution.
        assigned_by: String,
        /// Assignment timestamp used when the value changes.
        assigned_at: Timestamp,
    },
    /// Remove the device's desired state ("stop all containers").
    Clear {
        /// Target device.
        device_id: DeviceId,
        /// Owning tenant.
        tenant_id: TenantId,
    },
    /// Update the projected deployment status from an agent report.
    ProjectStatus {
        /// Target device.
        device_id: DeviceId,
        /// Owning tenant.
        tenant_id: TenantId,
        /// Reported status.
        status: DeploymentStatus,
    },
}

// ============================================================================
// SECTION: Wire Documents
// ============================================================================

/// Desired-state document pulled by the edge agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredStateDocument {
    /// Target device.
    pub device_id: DeviceId,
    /// Bundle to run.
    pub bundle_id: BundleId,
    /// Version to run.
    pub version: SemverVersion,
    /// Signed manifest URL.
    pub manifest_url: String,
    /// Manifest checksum.
    pub checksum: Checksum,
    /// Manifest size in bytes.
    pub size_bytes: u64,
    /// When the desired state was assigned.
    pub assigned_at: Timestamp,
}

/// Explicit empty desired state: the device should stop all containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyDesiredState {
    /// Target device.
    pub device_id: DeviceId,
    /// Always `null` on the wire.
    pub desired_state: Option<serde_json::Value>,
}

/// Response returned to the agent's desired-state pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DesiredStateResponse {
    /// A desired state exists for the device.
    Assigned(DesiredStateDocument),
    /// No desired state; the agent stops all containers.
    Empty(EmptyDesiredState),
}

impl DesiredStateResponse {
    /// Builds the wire response from an index record and its catalog entry.
    ///
    /// The catalog entry supplies the manifest location; the index record
    /// stays the source of truth for the assigned version.
    #[must_use]
    pub fn assigned(state: &DeviceDesiredState, version: &BundleVersionRecord) -> Self {
        Self::Assigned(DesiredStateDocument {
            device_id: state.device_id,
            bundle_id: state.bundle_id,
            version: state.bundle_version.clone(),
            manifest_url: version.blob_uri.clone(),
            checksum: version.checksum.clone(),
            size_bytes: version.size_bytes,
            assigned_at: state.assigned_at,
        })
    }

    /// Builds the explicit empty response for a device.
    #[must_use]
    pub const fn empty(device_id: DeviceId) -> Self {
        Self::Empty(EmptyDesiredState {
            device_id,
            desired_state: None,
        })
    }
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::DesiredStateResponse;
    use crate::core::identifiers::DeviceId;

    #[test]
    fn empty_response_serializes_with_null_desired_state() {
        let device_id = DeviceId::random();
        let response = DesiredStateResponse::empty(device_id);
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["deviceId"], serde_json::json!(device_id.to_string()));
        assert!(json["desiredState"].is_null());
    }
}
