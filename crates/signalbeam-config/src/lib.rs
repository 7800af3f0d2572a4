// signalbeam-config/src/lib.rs
// ============================================================================
// Module: SignalBeam Configuration Library
// Description: Configuration loading and validation.
// Purpose: Expose the strict, fail-closed configuration surface.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and range
//! limits. Missing or invalid configuration fails closed; every tunable
//! carries the documented default.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AssignmentConfig;
pub use config::ConfigError;
pub use config::ExecutorSection;
pub use config::ReconcileConfig;
pub use config::RolloutSection;
pub use config::SignalBeamConfig;
