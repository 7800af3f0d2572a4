// signalbeam-core/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Shared fixtures for rollout integration tests.
// ============================================================================
//! ## Overview
//! A fixture wiring the in-memory stores with a published bundle and a
//! handful of helpers for building requests and driving reports.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use signalbeam_core::AgentReport;
use signalbeam_core::BundleId;
use signalbeam_core::BundleVersionRecord;
use signalbeam_core::Checksum;
use signalbeam_core::ContainerSpec;
use signalbeam_core::CreateRolloutRequest;
use signalbeam_core::DeploymentStatus;
use signalbeam_core::DeviceId;
use signalbeam_core::DeviceRecord;
use signalbeam_core::DurationMillis;
use signalbeam_core::ExecutorConfig;
use signalbeam_core::MemoryBundleCatalog;
use signalbeam_core::MemoryDeviceDirectory;
use signalbeam_core::MemoryStore;
use signalbeam_core::PhasePlan;
use signalbeam_core::PlannerConfig;
use signalbeam_core::RestartPolicy;
use signalbeam_core::RolloutExecutor;
use signalbeam_core::RolloutId;
use signalbeam_core::RolloutPlanner;
use signalbeam_core::SemverVersion;
use signalbeam_core::TargetSelector;
use signalbeam_core::TenantId;
use signalbeam_core::Timestamp;
use signalbeam_core::VersionStatus;
use tag_logic::TagSet;

/// Base timestamp all test clocks start from.
pub const BASE_MILLIS: i64 = 1_750_000_000_000;

/// Returns a timestamp `offset_millis` past the test epoch.
pub fn ts(offset_millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(BASE_MILLIS + offset_millis).expect("timestamp in range")
}

/// Shared wiring for rollout tests.
pub struct Fixture {
    /// Tenant under test.
    pub tenant: TenantId,
    /// In-memory store (rollouts, desired state, outbox).
    pub store: MemoryStore,
    /// In-memory device directory.
    pub directory: MemoryDeviceDirectory,
    /// In-memory bundle catalog.
    pub catalog: MemoryBundleCatalog,
    /// Bundle under rollout.
    pub bundle_id: BundleId,
}

impl Fixture {
    /// Builds a fixture with versions 1.0.0 and 2.0.0 published.
    pub fn new() -> Self {
        let fixture = Self {
            tenant: TenantId::random(),
            store: MemoryStore::new(),
            directory: MemoryDeviceDirectory::new(),
            catalog: MemoryBundleCatalog::new(),
            bundle_id: BundleId::random(),
        };
        fixture.publish_version("1.0.0");
        fixture.publish_version("2.0.0");
        fixture
    }

    /// Publishes a version of the fixture bundle.
    pub fn publish_version(&self, version: &str) {
        let record = BundleVersionRecord {
            bundle_id: self.bundle_id,
            version: SemverVersion::parse(version).expect("version"),
            containers: vec![ContainerSpec {
                name: "telemetry".to_string(),
                image: format!("registry.example.com/telemetry:{version}"),
                env: BTreeMap::new(),
                ports: Vec::new(),
                volumes: Vec::new(),
                restart_policy: RestartPolicy::Always,
            }],
            checksum: Checksum::parse(format!("sha256:{}", "0".repeat(64))).expect("checksum"),
            size_bytes: 4_096,
            blob_uri: format!("https://blobs.example.com/{}/{version}", self.bundle_id),
            status: VersionStatus::Published,
            created_at: ts(0),
        };
        self.catalog.add_version(record).expect("catalog add");
    }

    /// Registers `count` devices with the given raw tags.
    pub fn add_devices(&self, count: usize, raw_tags: &[&str]) -> Vec<DeviceId> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let device_id = DeviceId::random();
            self.directory
                .add_device(DeviceRecord {
                    device_id,
                    tenant_id: self.tenant,
                    tags: TagSet::from_raw(raw_tags.iter().copied()),
                    group_id: None,
                    assigned_bundle_id: None,
                    deployment_status: DeploymentStatus::Pending,
                })
                .expect("add device");
            ids.push(device_id);
        }
        ids.sort();
        ids
    }

    /// Builds a planner over the fixture stores.
    pub fn planner(
        &self,
    ) -> RolloutPlanner<MemoryStore, MemoryBundleCatalog, MemoryDeviceDirectory> {
        RolloutPlanner::new(
            self.store.clone(),
            self.catalog.clone(),
            self.directory.clone(),
            PlannerConfig::default(),
        )
    }

    /// Builds an executor with the default configuration.
    pub fn executor(&self) -> RolloutExecutor<MemoryStore> {
        self.executor_with(ExecutorConfig::default())
    }

    /// Builds an executor with a custom configuration.
    pub fn executor_with(&self, config: ExecutorConfig) -> RolloutExecutor<MemoryStore> {
        RolloutExecutor::new(self.store.clone(), config)
    }

    /// Builds a create request targeting all devices.
    pub fn request(&self, rollout_id: RolloutId, phases: &[(&str, f64)]) -> CreateRolloutRequest {
        CreateRolloutRequest {
            rollout_id,
            tenant_id: self.tenant,
            bundle_id: self.bundle_id,
            target_version: "2.0.0".to_string(),
            previous_version: Some("1.0.0".to_string()),
            name: "fleet upgrade".to_string(),
            description: None,
            created_by: "ops@example.com".to_string(),
            selector: TargetSelector::AllDevices,
            phases: phases
                .iter()
                .map(|(name, percentage)| PhasePlan {
                    name: (*name).to_string(),
                    target_percentage: *percentage,
                    min_healthy_duration: None,
                })
                .collect(),
            failure_threshold: Some(0.05),
        }
    }

    /// Builds an agent report.
    pub fn report(
        &self,
        device_id: DeviceId,
        status: DeploymentStatus,
        version: Option<&str>,
        at: Timestamp,
    ) -> AgentReport {
        AgentReport {
            device_id,
            timestamp: at,
            current_bundle_id: version.map(|_| self.bundle_id),
            current_version: version.map(|raw| SemverVersion::parse(raw).expect("version")),
            deployment_status: status,
            reconciliation_error: match status {
                DeploymentStatus::Failed => Some("container crash loop".to_string()),
                _ => None,
            },
            containers: Vec::new(),
        }
    }

    /// Counts outbox events by subject.
    pub fn subject_count(&self, subject: &str) -> usize {
        self.store
            .event_subjects()
            .expect("event subjects")
            .iter()
            .filter(|entry| **entry == subject)
            .count()
    }
}

/// Convenience duration helper.
pub fn minutes(value: u64) -> DurationMillis {
    DurationMillis::from_minutes(value)
}
