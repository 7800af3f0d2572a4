// signalbeam-store-sqlite/src/lib.rs
// ============================================================================
// Module: SignalBeam SQLite Store Library
// Description: Durable store backend on SQLite.
// Purpose: Expose the SQLite rollout store and its configuration.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! A durable implementation of the SignalBeam store interfaces over a
//! single `SQLite` database: rollouts, phases, device assignments, the
//! desired-state index, alerts, and the transactional outbox. Commits are
//! applied in one transaction, conditional on the per-rollout
//! optimistic-concurrency counter.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteRolloutStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
