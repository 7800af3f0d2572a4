// signalbeam-core/src/core/error.rs
// ============================================================================
// Module: SignalBeam Error Classification
// Description: The five error classes and their retry policy.
// Purpose: Let hosts decide retry behavior without matching on every
// module's error enum.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every fallible SignalBeam operation returns a module-specific error enum;
//! each enum classifies itself into one of five classes. Hosts retry
//! `Transient` with backoff and `Conflict` (optimistic-concurrency misses)
//! from a fresh load; the other classes propagate to the caller. `Fatal`
//! additionally fails the rollout and raises a critical alert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Classes
// ============================================================================

/// Classification of a SignalBeam error for the host's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected input; surfaced synchronously with structured detail.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// Concurrent modification or conflicting ownership.
    Conflict,
    /// Infrastructure failure; safe to retry with backoff.
    Transient,
    /// Invariant violation or corruption; no automatic recovery.
    Fatal,
}

impl ErrorClass {
    /// Returns true when the host should retry the operation internally.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Conflict)
    }
}

/// Errors that can report their [`ErrorClass`].
pub trait Classify {
    /// Returns the class of this error.
    fn class(&self) -> ErrorClass;
}
