// signalbeam-executor/src/backoff.rs
// ============================================================================
// Module: Transient Backoff
// Description: Jittered exponential backoff for transient failures.
// Purpose: Space out retries of store and bus operations up to a ceiling.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Delays double from the initial value up to the ceiling, with up to 25%
//! random jitter subtracted so independent actors do not retry in lockstep.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Jittered exponential backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Initial delay.
    initial: Duration,
    /// Delay ceiling.
    ceiling: Duration,
    /// Next un-jittered delay.
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial`, capped at `ceiling`.
    #[must_use]
    pub const fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            initial,
            ceiling,
            current: initial,
        }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.ceiling);
        self.current = self.current.saturating_mul(2).min(self.ceiling);

        let jitter_budget = base.as_millis() / 4;
        if jitter_budget == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_budget);
        base.saturating_sub(Duration::from_millis(u64::try_from(jitter).unwrap_or(0)))
    }

    /// Resets the schedule to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
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

    use std::time::Duration;

    use super::Backoff;

    #[test]
    fn delays_grow_toward_the_ceiling_with_bounded_jitter() {
        let mut backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        let first = backoff.next_delay();
        assert!(first <= Duration::from_millis(100));
        assert!(first >= Duration::from_millis(75));

        let second = backoff.next_delay();
        assert!(second <= Duration::from_millis(200));

        let third = backoff.next_delay();
        let fourth = backoff.next_delay();
        assert!(third <= Duration::from_millis(400));
        assert!(fourth <= Duration::from_millis(400));
        assert!(fourth >= Duration::from_millis(300));
    }

    #[test]
    fn reset_returns_to_the_initial_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(1));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(50));
    }
}
