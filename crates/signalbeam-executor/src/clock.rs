// signalbeam-executor/src/clock.rs
// ============================================================================
// Module: Wall Clock
// Description: Wall-clock timestamps for the executor edge.
// Purpose: Keep clock reads at the host boundary; the core only ever sees
// explicit timestamps.
// Dependencies: signalbeam-core, time
// ============================================================================

//! ## Overview
//! The deterministic core never reads the clock. Every host call site asks
//! this module for `now` and threads it through, which keeps engine
//! behavior replayable in tests with synthetic timestamps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use signalbeam_core::Timestamp;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Wall Clock
// ============================================================================

/// Wall-clock source for the executor host.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl WallClock {
    /// Returns the current UTC time as a core timestamp.
    #[must_use]
    pub fn now() -> Timestamp {
        Timestamp::new(OffsetDateTime::now_utc())
    }
}
