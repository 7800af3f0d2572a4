// signalbeam-core/src/runtime/memory.rs
// ============================================================================
// Module: SignalBeam In-Memory Stores
// Description: In-memory implementations of the store interfaces.
// Purpose: Back tests and single-process wiring without a database.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The in-memory stores mirror the durable backend's semantics exactly:
//! optimistic concurrency on rollout commits, idempotent desired-state
//! assignment, and an ordered outbox written atomically with each commit.
//! They are `Clone`-able handles over shared state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Alert;
use crate::core::AlertId;
use crate::core::AlertKey;
use crate::core::AlertStatus;
use crate::core::BundleId;
use crate::core::BundleVersionRecord;
use crate::core::DeploymentStatus;
use crate::core::DesiredStateWrite;
use crate::core::DeviceDesiredState;
use crate::core::DeviceGroup;
use crate::core::DeviceId;
use crate::core::DeviceRecord;
use crate::core::DomainEvent;
use crate::core::GroupId;
use crate::core::GroupMembership;
use crate::core::RolloutAggregate;
use crate::core::RolloutId;
use crate::core::SemverVersion;
use crate::core::TenantId;
use crate::interfaces::AlertStore;
use crate::interfaces::BundleCatalog;
use crate::interfaces::CatalogError;
use crate::interfaces::DesiredStateStore;
use crate::interfaces::DeviceDirectory;
use crate::interfaces::DirectoryError;
use crate::interfaces::OutboxEntry;
use crate::interfaces::OutboxStore;
use crate::interfaces::RolloutCommit;
use crate::interfaces::RolloutStore;
use crate::interfaces::StoreError;
use crate::interfaces::StoreVersion;
use crate::interfaces::VersionedRollout;

// ============================================================================
// SECTION: Outbox Row
// ============================================================================

/// One in-memory outbox row.
#[derive(Debug, Clone)]
struct OutboxRow {
    /// Sequence assigned at insert.
    seq: u64,
    /// Serialized event.
    event: DomainEvent,
    /// Whether the relay already published the row.
    published: bool,
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// Shared state behind a [`MemoryStore`] handle.
#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// Rollout aggregates with their versions.
    rollouts: BTreeMap<RolloutId, (RolloutAggregate, StoreVersion)>,
    /// Desired-state index.
    desired: BTreeMap<(TenantId, DeviceId), DeviceDesiredState>,
    /// Outbox rows in insertion order.
    outbox: Vec<OutboxRow>,
    /// Next outbox sequence.
    next_seq: u64,
}

/// In-memory rollout store, desired-state index, and outbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Shared state.
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every outbox event's subject in emission order, including
    /// published rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the lock is poisoned.
    pub fn event_subjects(&self) -> Result<Vec<&'static str>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.outbox.iter().map(|row| row.event.subject()).collect())
    }

    /// Returns every outbox event in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the lock is poisoned.
    pub fn events(&self) -> Result<Vec<DomainEvent>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.outbox.iter().map(|row| row.event.clone()).collect())
    }

    /// Locks the shared state, failing closed on poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }
}

/// Applies desired-state writes, returning true when anything changed.
fn apply_desired_writes(
    desired: &mut BTreeMap<(TenantId, DeviceId), DeviceDesiredState>,
    writes: &[DesiredStateWrite],
) -> bool {
    let mut changed = false;
    for write in writes {
        match write {
            DesiredStateWrite::Assign {
                device_id,
                tenant_id,
                bundle_id,
                version,
                assigned_by,
                assigned_at,
            } => {
                let key = (*tenant_id, *device_id);
                let unchanged = desired.get(&key).is_some_and(|state| {
                    state.bundle_id == *bundle_id && state.bundle_version == *version
                });
                if unchanged {
                    continue;
                }
                desired.insert(
                    key,
                    DeviceDesiredState {
                        device_id: *device_id,
                        tenant_id: *tenant_id,
                        bundle_id: *bundle_id,
                        bundle_version: version.clone(),
                        assigned_at: *assigned_at,
                        assigned_by: assigned_by.clone(),
                        deployment_status: DeploymentStatus::Pending,
                    },
                );
                changed = true;
            }
            DesiredStateWrite::Clear {
                device_id,
                tenant_id,
            } => {
                changed |= desired.remove(&(*tenant_id, *device_id)).is_some();
            }
            DesiredStateWrite::ProjectStatus {
                device_id,
                tenant_id,
                status,
            } => {
                if let Some(state) = desired.get_mut(&(*tenant_id, *device_id)) {
                    if state.deployment_status != *status {
                        state.deployment_status = *status;
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

/// Appends events to the outbox.
fn append_events(inner: &mut MemoryStoreInner, events: &[DomainEvent]) {
    for event in events {
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.outbox.push(OutboxRow {
            seq,
            event: event.clone(),
            published: false,
        });
    }
}

impl RolloutStore for MemoryStore {
    fn insert_rollout(
        &self,
        aggregate: &RolloutAggregate,
        events: &[DomainEvent],
    ) -> Result<StoreVersion, StoreError> {
        let mut inner = self.lock()?;
        let rollout_id = aggregate.rollout.rollout_id;
        if inner.rollouts.contains_key(&rollout_id) {
            return Err(StoreError::AlreadyExists(rollout_id));
        }
        let version = StoreVersion::new(1);
        inner.rollouts.insert(rollout_id, (aggregate.clone(), version));
        append_events(&mut inner, events);
        Ok(version)
    }

    fn load_rollout(&self, rollout_id: RolloutId) -> Result<Option<VersionedRollout>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.rollouts.get(&rollout_id).map(|(aggregate, version)| VersionedRollout {
            aggregate: aggregate.clone(),
            version: *version,
        }))
    }

    fn commit(&self, commit: &RolloutCommit) -> Result<StoreVersion, StoreError> {
        let mut inner = self.lock()?;
        let (aggregate, version) = inner
            .rollouts
            .get_mut(&commit.rollout_id)
            .ok_or_else(|| StoreError::Invalid(format!("unknown rollout {}", commit.rollout_id)))?;
        if *version != commit.expected_version {
            return Err(StoreError::VersionConflict {
                rollout_id: commit.rollout_id,
                expected: commit.expected_version,
            });
        }

        aggregate.rollout = commit.rollout.clone();
        for phase in &commit.phases {
            if let Some(state) =
                aggregate.phases.iter_mut().find(|state| state.phase.phase_id == phase.phase_id)
            {
                state.phase = phase.clone();
            }
        }
        for assignment in &commit.assignments {
            let slot = aggregate
                .phases
                .iter_mut()
                .flat_map(|state| state.assignments.iter_mut())
                .find(|existing| existing.assignment_id == assignment.assignment_id);
            if let Some(existing) = slot {
                *existing = assignment.clone();
            }
        }
        let next = version.next();
        *version = next;

        apply_desired_writes(&mut inner.desired, &commit.desired_writes);
        append_events(&mut inner, &commit.events);
        Ok(next)
    }

    fn list_open_rollouts(&self, tenant_id: TenantId) -> Result<Vec<RolloutId>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .rollouts
            .values()
            .filter(|(aggregate, _)| {
                aggregate.rollout.tenant_id == tenant_id
                    && !aggregate.rollout.status.is_terminal()
            })
            .map(|(aggregate, _)| aggregate.rollout.rollout_id)
            .collect())
    }

    fn active_device_ids(&self, tenant_id: TenantId) -> Result<BTreeSet<DeviceId>, StoreError> {
        let inner = self.lock()?;
        let mut devices = BTreeSet::new();
        for (aggregate, _) in inner.rollouts.values() {
            if aggregate.rollout.tenant_id != tenant_id {
                continue;
            }
            for state in &aggregate.phases {
                for assignment in &state.assignments {
                    if !assignment.status.is_terminal() {
                        devices.insert(assignment.device_id);
                    }
                }
            }
        }
        Ok(devices)
    }

    fn find_active_rollout_for_device(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<RolloutId>, StoreError> {
        let inner = self.lock()?;
        for (aggregate, _) in inner.rollouts.values() {
            if aggregate.rollout.tenant_id != tenant_id {
                continue;
            }
            let held = aggregate.phases.iter().flat_map(|state| state.assignments.iter()).any(
                |assignment| {
                    assignment.device_id == device_id && !assignment.status.is_terminal()
                },
            );
            if held {
                return Ok(Some(aggregate.rollout.rollout_id));
            }
        }
        Ok(None)
    }
}

impl DesiredStateStore for MemoryStore {
    fn read(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<DeviceDesiredState>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.desired.get(&(tenant_id, device_id)).cloned())
    }

    fn apply_standalone(
        &self,
        writes: &[DesiredStateWrite],
        events: &[DomainEvent],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let changed = apply_desired_writes(&mut inner.desired, writes);
        if changed {
            append_events(&mut inner, events);
        }
        Ok(())
    }
}

impl OutboxStore for MemoryStore {
    fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let inner = self.lock()?;
        let mut entries = Vec::new();
        for row in inner.outbox.iter().filter(|row| !row.published).take(limit) {
            let payload = serde_json::to_value(&row.event)
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            entries.push(OutboxEntry {
                seq: row.seq,
                subject: row.event.subject().to_string(),
                payload,
                created_at: None,
            });
        }
        Ok(entries)
    }

    fn mark_published(&self, seqs: &[u64]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for row in &mut inner.outbox {
            if seqs.contains(&row.seq) {
                row.published = true;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Memory Alert Store
// ============================================================================

/// Shared state behind a [`MemoryAlertStore`] handle.
#[derive(Debug, Default)]
struct MemoryAlertStoreInner {
    /// Alerts by identifier.
    alerts: BTreeMap<AlertId, Alert>,
    /// Events emitted by alert upserts, in order.
    events: Vec<DomainEvent>,
}

/// In-memory alert store.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertStore {
    /// Shared state.
    inner: Arc<Mutex<MemoryAlertStoreInner>>,
}

impl MemoryAlertStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event emitted so far.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the lock is poisoned.
    pub fn events(&self) -> Result<Vec<DomainEvent>, StoreError> {
        Ok(self.lock()?.events.clone())
    }

    /// Locks the shared state, failing closed on poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryAlertStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("alert store lock poisoned".to_string()))
    }
}

impl AlertStore for MemoryAlertStore {
    fn find_active(&self, key: &AlertKey) -> Result<Option<Alert>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .alerts
            .values()
            .find(|alert| alert.status == AlertStatus::Active && alert.key() == *key)
            .cloned())
    }

    fn load(&self, alert_id: AlertId) -> Result<Option<Alert>, StoreError> {
        Ok(self.lock()?.alerts.get(&alert_id).cloned())
    }

    fn upsert(&self, alert: &Alert, events: &[DomainEvent]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.alerts.insert(alert.alert_id, alert.clone());
        inner.events.extend(events.iter().cloned());
        Ok(())
    }

    fn list_open(&self, tenant_id: TenantId) -> Result<Vec<Alert>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .alerts
            .values()
            .filter(|alert| {
                alert.tenant_id == tenant_id && alert.status != AlertStatus::Resolved
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Memory Device Directory
// ============================================================================

/// Shared state behind a [`MemoryDeviceDirectory`] handle.
#[derive(Debug, Default)]
struct MemoryDirectoryInner {
    /// Devices by identifier.
    devices: BTreeMap<DeviceId, DeviceRecord>,
    /// Groups by identifier.
    groups: BTreeMap<GroupId, DeviceGroup>,
    /// Static group memberships.
    memberships: Vec<GroupMembership>,
}

/// In-memory device directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceDirectory {
    /// Shared state.
    inner: Arc<Mutex<MemoryDirectoryInner>>,
}

impl MemoryDeviceDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] when the lock is poisoned.
    pub fn add_device(&self, device: DeviceRecord) -> Result<(), DirectoryError> {
        self.lock()?.devices.insert(device.device_id, device);
        Ok(())
    }

    /// Registers a group.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] when the lock is poisoned.
    pub fn add_group(&self, group: DeviceGroup) -> Result<(), DirectoryError> {
        self.lock()?.groups.insert(group.group_id, group);
        Ok(())
    }

    /// Registers a static membership row.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Backend`] when the lock is poisoned.
    pub fn add_membership(&self, membership: GroupMembership) -> Result<(), DirectoryError> {
        self.lock()?.memberships.push(membership);
        Ok(())
    }

    /// Locks the shared state, failing closed on poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryDirectoryInner>, DirectoryError> {
        self.inner
            .lock()
            .map_err(|_| DirectoryError::Backend("directory lock poisoned".to_string()))
    }
}

impl DeviceDirectory for MemoryDeviceDirectory {
    fn list_devices(&self, tenant_id: TenantId) -> Result<Vec<DeviceRecord>, DirectoryError> {
        let inner = self.lock()?;
        Ok(inner
            .devices
            .values()
            .filter(|device| device.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn validate_devices(
        &self,
        tenant_id: TenantId,
        device_ids: &[DeviceId],
    ) -> Result<(), DirectoryError> {
        let inner = self.lock()?;
        let unknown = device_ids
            .iter()
            .filter(|device_id| {
                !inner
                    .devices
                    .get(device_id)
                    .is_some_and(|device| device.tenant_id == tenant_id)
            })
            .count();
        if unknown > 0 {
            return Err(DirectoryError::UnknownDevices(unknown));
        }
        Ok(())
    }

    fn group(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<DeviceGroup, DirectoryError> {
        let inner = self.lock()?;
        inner
            .groups
            .get(&group_id)
            .filter(|group| group.tenant_id == tenant_id)
            .cloned()
            .ok_or(DirectoryError::GroupNotFound(group_id))
    }

    fn static_members(
        &self,
        tenant_id: TenantId,
        group_id: GroupId,
    ) -> Result<Vec<DeviceId>, DirectoryError> {
        let inner = self.lock()?;
        Ok(inner
            .memberships
            .iter()
            .filter(|membership| membership.group_id == group_id)
            .filter(|membership| {
                inner
                    .devices
                    .get(&membership.device_id)
                    .is_some_and(|device| device.tenant_id == tenant_id)
            })
            .map(|membership| membership.device_id)
            .collect())
    }
}

// ============================================================================
// SECTION: Memory Bundle Catalog
// ============================================================================

/// Shared state behind a [`MemoryBundleCatalog`] handle.
#[derive(Debug, Default)]
struct MemoryCatalogInner {
    /// Version records by `(bundle, version)`.
    versions: BTreeMap<(BundleId, SemverVersion), BundleVersionRecord>,
}

/// In-memory bundle catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundleCatalog {
    /// Shared state.
    inner: Arc<Mutex<MemoryCatalogInner>>,
}

impl MemoryBundleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a version record.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Backend`] when the lock is poisoned.
    pub fn add_version(&self, record: BundleVersionRecord) -> Result<(), CatalogError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| CatalogError::Backend("catalog lock poisoned".to_string()))?;
        inner.versions.insert((record.bundle_id, record.version.clone()), record);
        Ok(())
    }
}

impl BundleCatalog for MemoryBundleCatalog {
    fn version(
        &self,
        bundle_id: BundleId,
        version: &SemverVersion,
    ) -> Result<Option<BundleVersionRecord>, CatalogError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| CatalogError::Backend("catalog lock poisoned".to_string()))?;
        Ok(inner.versions.get(&(bundle_id, version.clone())).cloned())
    }
}
