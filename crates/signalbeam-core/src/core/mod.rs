// signalbeam-core/src/core/mod.rs
// ============================================================================
// Module: SignalBeam Core Types
// Description: Domain model for rollouts, devices, bundles, and alerts.
// Purpose: Wire together the core type modules and re-export their surface.
// Dependencies: crate::core::*
// ============================================================================

//! ## Overview
//! Core types are plain values: aggregates reference each other by
//! identifier, never by pointer, and are loaded and stored as rows. All
//! records are serializable and carry explicit timestamps supplied by the
//! host.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod alert;
pub mod bundle;
pub mod device;
pub mod error;
pub mod events;
pub mod group;
pub mod identifiers;
pub mod rollout;
pub mod state_index;
pub mod time;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use alert::Alert;
pub use alert::AlertKey;
pub use alert::AlertSeverity;
pub use alert::AlertSignal;
pub use alert::AlertStatus;
pub use alert::AlertType;
pub use bundle::Bundle;
pub use bundle::BundleError;
pub use bundle::BundleVersionRecord;
pub use bundle::ContainerSpec;
pub use bundle::PortMapping;
pub use bundle::RestartPolicy;
pub use bundle::VersionStatus;
pub use bundle::VolumeMount;
pub use device::AgentReport;
pub use device::DeploymentStatus;
pub use device::DeviceRecord;
pub use device::ReportedContainer;
pub use error::Classify;
pub use error::ErrorClass;
pub use events::DomainEvent;
pub use group::DeviceGroup;
pub use group::GroupError;
pub use group::GroupMembership;
pub use group::GroupType;
pub use identifiers::AlertId;
pub use identifiers::AssignmentId;
pub use identifiers::BundleId;
pub use identifiers::DeviceId;
pub use identifiers::GroupId;
pub use identifiers::PhaseId;
pub use identifiers::RolloutId;
pub use identifiers::TenantId;
pub use rollout::AssignmentRecord;
pub use rollout::AssignmentStatus;
pub use rollout::InvariantViolation;
pub use rollout::PhaseState;
pub use rollout::PhaseStatus;
pub use rollout::RollbackReason;
pub use rollout::RolloutAggregate;
pub use rollout::RolloutPhaseRecord;
pub use rollout::RolloutRecord;
pub use rollout::RolloutStatus;
pub use state_index::DesiredStateDocument;
pub use state_index::DesiredStateResponse;
pub use state_index::DesiredStateWrite;
pub use state_index::DeviceDesiredState;
pub use state_index::EmptyDesiredState;
pub use time::DurationMillis;
pub use time::Timestamp;
pub use version::Checksum;
pub use version::ChecksumError;
pub use version::SemverVersion;
pub use version::VersionError;
