// signalbeam-core/src/interfaces/mod.rs
// ============================================================================
// Module: SignalBeam Interfaces
// Description: Backend-agnostic interfaces for stores and collaborators.
// Purpose: Define the contract surfaces used by the rollout runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the rollout core integrates with persistence, the
//! device registry, and the bundle catalog without embedding backend
//! details. Implementations must fail closed on missing or invalid data.
//! All writes to one rollout go through [`RolloutStore::commit`], which the
//! backend applies atomically, conditional on the optimistic-concurrency
//! version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Alert;
use crate::core::AlertId;
use crate::core::AlertKey;
use crate::core::BundleId;
use crate::core::BundleVersionRecord;
use crate::core::Classify;
use crate::core::DesiredStateWrite;
use crate::core::DeviceDesiredState;
use crate::core::DeviceGroup;
use crate::core::DeviceId;
use crate::core::DeviceRecord;
use crate::core::DomainEvent;
use crate::core::ErrorClass;
use crate::core::GroupId;
use crate::core::RolloutAggregate;
use crate::core::RolloutId;
use crate::core::RolloutRecord;
use crate::core::SemverVersion;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::rollout::AssignmentRecord;
use crate::core::rollout::RolloutPhaseRecord;

// ============================================================================
// SECTION: Store Versioning
// ============================================================================

/// Optimistic-concurrency version counter for one rollout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct StoreVersion(u64);

impl std::fmt::Display for StoreVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl StoreVersion {
    /// Creates a version from a raw counter.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// A rollout aggregate paired with its store version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRollout {
    /// The aggregate as loaded.
    pub aggregate: RolloutAggregate,
    /// Version the load observed.
    pub version: StoreVersion,
}

// ============================================================================
// SECTION: Rollout Commit
// ============================================================================

/// An atomic write against one rollout.
///
/// The backend applies the rollout row, the changed phase and assignment
/// rows, the desired-state writes, and one outbox row per event in a single
/// transaction, conditional on `expected_version`. Nothing is applied on a
/// version mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutCommit {
    /// Rollout being written.
    pub rollout_id: RolloutId,
    /// Version the transition was computed against.
    pub expected_version: StoreVersion,
    /// Full rollout row.
    pub rollout: RolloutRecord,
    /// Changed phase rows.
    pub phases: Vec<RolloutPhaseRecord>,
    /// Changed assignment rows.
    pub assignments: Vec<AssignmentRecord>,
    /// Desired-state index writes.
    pub desired_writes: Vec<DesiredStateWrite>,
    /// Events appended to the outbox.
    pub events: Vec<DomainEvent>,
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Rollout store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O failure; retryable.
    #[error("rollout store io error: {0}")]
    Io(String),
    /// Optimistic-concurrency version mismatch.
    #[error("rollout {rollout_id} version conflict (expected {expected})")]
    VersionConflict {
        /// Rollout that conflicted.
        rollout_id: RolloutId,
        /// Version the writer expected.
        expected: StoreVersion,
    },
    /// A rollout already exists under this identifier.
    #[error("rollout already exists: {0}")]
    AlreadyExists(RolloutId),
    /// Stored data failed integrity checks.
    #[error("rollout store corruption: {0}")]
    Corrupt(String),
    /// Stored data is invalid.
    #[error("rollout store invalid data: {0}")]
    Invalid(String),
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) => ErrorClass::Transient,
            Self::VersionConflict {
                ..
            }
            | Self::AlreadyExists(_) => ErrorClass::Conflict,
            Self::Corrupt(_) => ErrorClass::Fatal,
            Self::Invalid(_) => ErrorClass::Validation,
        }
    }
}

// ============================================================================
// SECTION: Rollout Store
// ============================================================================

/// Persistence for rollout aggregates, the desired-state index, and the
/// event outbox.
pub trait RolloutStore {
    /// Inserts a freshly planned rollout with its creation events.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when the identifier is taken.
    fn insert_rollout(
        &self,
        aggregate: &RolloutAggregate,
        events: &[DomainEvent],
    ) -> Result<StoreVersion, StoreError>;

    /// Loads a rollout aggregate with its current version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_rollout(&self, rollout_id: RolloutId) -> Result<Option<VersionedRollout>, StoreError>;

    /// Applies an atomic commit against one rollout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when another writer advanced
    /// the rollout first; nothing is applied in that case.
    fn commit(&self, commit: &RolloutCommit) -> Result<StoreVersion, StoreError>;

    /// Lists non-terminal rollouts for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_open_rollouts(&self, tenant_id: TenantId) -> Result<Vec<RolloutId>, StoreError>;

    /// Returns devices holding a non-terminal assignment in any rollout of
    /// the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn active_device_ids(&self, tenant_id: TenantId) -> Result<BTreeSet<DeviceId>, StoreError>;

    /// Finds the rollout holding a non-terminal assignment for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_active_rollout_for_device(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<RolloutId>, StoreError>;
}

// ============================================================================
// SECTION: Desired-State Store
// ============================================================================

/// Read and standalone-write surface of the desired-state index.
///
/// Rollout-driven writes travel inside [`RolloutCommit`]; this trait covers
/// the agent read path and operator-issued standalone assignments.
pub trait DesiredStateStore {
    /// Reads the desired state for a device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reading fails.
    fn read(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<DeviceDesiredState>, StoreError>;

    /// Applies standalone writes with their events atomically.
    ///
    /// Assigning an unchanged `(bundle_id, version)` is a no-op and emits
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when writing fails.
    fn apply_standalone(
        &self,
        writes: &[DesiredStateWrite],
        events: &[DomainEvent],
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Device Directory
// ============================================================================

/// Device directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The group does not exist for this tenant.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),
    /// One or more devices do not belong to the tenant.
    #[error("unknown devices for tenant: {0} device(s)")]
    UnknownDevices(usize),
    /// Directory backend failure; retryable.
    #[error("device directory error: {0}")]
    Backend(String),
}

impl Classify for DirectoryError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::GroupNotFound(_) => ErrorClass::NotFound,
            Self::UnknownDevices(_) => ErrorClass::Validation,
            Self::Backend(_) => ErrorClass::Transient,
        }
    }
}

/// Read-only view of the external device registry.
pub trait DeviceDirectory {
    /// Lists all devices of a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the registry is unreachable.
    fn list_devices(&self, tenant_id: TenantId) -> Result<Vec<DeviceRecord>, DirectoryError>;

    /// Validates that every identifier belongs to the tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownDevices`] listing the count of
    /// unknown identifiers.
    fn validate_devices(
        &self,
        tenant_id: TenantId,
        device_ids: &[DeviceId],
    ) -> Result<(), DirectoryError>;

    /// Loads a group by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::GroupNotFound`] when absent.
    fn group(&self, tenant_id: TenantId, group_id: GroupId)
    -> Result<DeviceGroup, DirectoryError>;

    /// Lists explicit member devices of a static group.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the registry is unreachable.
    fn static_members(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<Vec<DeviceId>, DirectoryError>;
}

// ============================================================================
// SECTION: Bundle Catalog
// ============================================================================

/// Bundle catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog backend failure; retryable.
    #[error("bundle catalog error: {0}")]
    Backend(String),
}

impl Classify for CatalogError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Backend(_) => ErrorClass::Transient,
        }
    }
}

/// Read-only view of the bundle catalog.
pub trait BundleCatalog {
    /// Looks up one bundle version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog is unreachable.
    fn version(
        &self,
        bundle_id: BundleId,
        version: &SemverVersion,
    ) -> Result<Option<BundleVersionRecord>, CatalogError>;
}

// ============================================================================
// SECTION: Alert Store
// ============================================================================

/// Persistence for alerts.
pub trait AlertStore {
    /// Finds the `Active` alert for a deduplication key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn find_active(&self, key: &AlertKey) -> Result<Option<Alert>, StoreError>;

    /// Loads an alert by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load(&self, alert_id: AlertId) -> Result<Option<Alert>, StoreError>;

    /// Inserts or replaces an alert together with its events atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when writing fails.
    fn upsert(&self, alert: &Alert, events: &[DomainEvent]) -> Result<(), StoreError>;

    /// Lists non-resolved alerts for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_open(&self, tenant_id: TenantId) -> Result<Vec<Alert>, StoreError>;
}

// ============================================================================
// SECTION: Event Outbox
// ============================================================================

/// One outbox row awaiting publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Monotonic sequence assigned at insert.
    pub seq: u64,
    /// Bus subject.
    pub subject: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// When the row was written, when the backend records it.
    pub created_at: Option<Timestamp>,
}

/// Read surface of the transactional outbox used by the relay.
pub trait OutboxStore {
    /// Fetches up to `limit` unpublished rows in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Marks rows as published.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_published(&self, seqs: &[u64]) -> Result<(), StoreError>;
}
