// signalbeam-core/src/core/bundle.rs
// ============================================================================
// Module: SignalBeam Bundles
// Description: Container bundles and their immutable versions.
// Purpose: Define the bundle catalog records consumed by rollout planning
// and the desired-state read path.
// Dependencies: crate::core::{identifiers, time, version}, serde, thiserror,
// url
// ============================================================================

//! ## Overview
//! A bundle is a named collection of container specifications deployed as a
//! unit. Bundles are append-only: versions are never mutated after creation
//! except for their `status` field. The core never inspects container
//! images; specs are carried opaquely to the edge agent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::core::identifiers::BundleId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::version::Checksum;
use crate::core::version::SemverVersion;

// ============================================================================
// SECTION: Version Status
// ============================================================================

/// Lifecycle status of a bundle version.
///
/// # Invariants
/// - `status` is the only mutable field of a bundle version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Version is being assembled and must not be deployed.
    Draft,
    /// Version is published and eligible for rollouts.
    Published,
    /// Version is deprecated; existing deployments stay, new rollouts are
    /// rejected.
    Deprecated,
}

// ============================================================================
// SECTION: Container Specs
// ============================================================================

/// Container restart policy applied by the edge agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Always restart the container when it exits.
    #[default]
    Always,
    /// Restart only on non-zero exit.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Never restart.
    Never,
}

/// Port mapping exposed by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Optional host port; the agent picks one when absent.
    pub host_port: Option<u16>,
}

/// Volume mount attached to a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Host path or named volume source.
    pub source: String,
    /// Mount target inside the container.
    pub target: String,
    /// Mount read-only when true.
    #[serde(default)]
    pub read_only: bool,
}

/// Specification of one container within a bundle version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name, unique within the bundle version.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Exposed ports.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Volume mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

// ============================================================================
// SECTION: Bundle Records
// ============================================================================

/// A named container bundle owned by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle identifier.
    pub bundle_id: BundleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Latest version, if any versions exist.
    pub latest_version: Option<SemverVersion>,
}

/// An immutable snapshot of a bundle's container specs.
///
/// # Invariants
/// - `(bundle_id, version)` is unique.
/// - Fields other than `status` are immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleVersionRecord {
    /// Owning bundle.
    pub bundle_id: BundleId,
    /// Semantic version tag.
    pub version: SemverVersion,
    /// Container specifications, in deployment order.
    pub containers: Vec<ContainerSpec>,
    /// Manifest checksum verified by the edge agent.
    pub checksum: Checksum,
    /// Manifest size in bytes.
    pub size_bytes: u64,
    /// Blob-storage URI of the manifest.
    pub blob_uri: String,
    /// Version lifecycle status.
    pub status: VersionStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Bundle Errors
// ============================================================================

/// Errors produced while validating a bundle version record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// The version has no containers.
    #[error("bundle version has no containers")]
    NoContainers,
    /// Two containers share a name.
    #[error("duplicate container name: {0}")]
    DuplicateContainerName(String),
    /// A container name or image reference was empty.
    #[error("container {0:?} has an empty name or image")]
    EmptyContainerField(String),
    /// The blob URI failed to parse.
    #[error("invalid blob uri: {0}")]
    InvalidBlobUri(String),
}

impl BundleVersionRecord {
    /// Validates structural invariants of this version record.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError`] when containers are missing, duplicated, or
    /// the blob URI is malformed.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.containers.is_empty() {
            return Err(BundleError::NoContainers);
        }

        let mut names = BTreeSet::new();
        for container in &self.containers {
            if container.name.is_empty() || container.image.is_empty() {
                return Err(BundleError::EmptyContainerField(container.name.clone()));
            }
            if !names.insert(container.name.as_str()) {
                return Err(BundleError::DuplicateContainerName(container.name.clone()));
            }
        }

        if Url::parse(&self.blob_uri).is_err() {
            return Err(BundleError::InvalidBlobUri(self.blob_uri.clone()));
        }

        Ok(())
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

    use std::collections::BTreeMap;

    use super::BundleError;
    use super::BundleVersionRecord;
    use super::ContainerSpec;
    use super::RestartPolicy;
    use super::VersionStatus;
    use crate::core::identifiers::BundleId;
    use crate::core::time::Timestamp;
    use crate::core::version::Checksum;
    use crate::core::version::SemverVersion;

    /// Builds a minimal valid version record.
    fn version_record() -> BundleVersionRecord {
        BundleVersionRecord {
            bundle_id: BundleId::random(),
            version: SemverVersion::parse("1.0.0").expect("version"),
            containers: vec![ContainerSpec {
                name: "telemetry".to_string(),
                image: "registry.example.com/telemetry:1.0.0".to_string(),
                env: BTreeMap::new(),
                ports: Vec::new(),
                volumes: Vec::new(),
                restart_policy: RestartPolicy::Always,
            }],
            checksum: Checksum::parse(format!("sha256:{}", "0".repeat(64))).expect("checksum"),
            size_bytes: 2_048,
            blob_uri: "https://blobs.example.com/bundles/telemetry/1.0.0".to_string(),
            status: VersionStatus::Published,
            created_at: Timestamp::from_unix_millis(0).expect("timestamp"),
        }
    }

    #[test]
    fn valid_record_passes_validation() {
        assert_eq!(version_record().validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_and_duplicate_containers() {
        let mut record = version_record();
        record.containers.clear();
        assert_eq!(record.validate(), Err(BundleError::NoContainers));

        let mut record = version_record();
        let duplicate = record.containers[0].clone();
        record.containers.push(duplicate);
        assert!(matches!(record.validate(), Err(BundleError::DuplicateContainerName(_))));
    }

    #[test]
    fn rejects_invalid_blob_uris() {
        let mut record = version_record();
        record.blob_uri = "not a uri".to_string();
        assert!(matches!(record.validate(), Err(BundleError::InvalidBlobUri(_))));
    }
}
