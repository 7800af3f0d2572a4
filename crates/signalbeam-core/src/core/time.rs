// signalbeam-core/src/core/time.rs
// ============================================================================
// Module: SignalBeam Time Model
// Description: Canonical timestamp and duration representations.
// Purpose: Provide explicit, host-supplied time values across SignalBeam
// records and wire documents.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time; every entry point takes an explicit
//! `now` supplied by the host. Timestamps serialize as RFC 3339 strings on
//! every wire surface. Durations are plain millisecond counts, which keeps
//! configuration files and stored records trivially comparable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in SignalBeam records and documents.
///
/// # Invariants
/// - Values are explicitly provided by hosts; the core never reads the
///   clock. Monotonicity is a host responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Creates a timestamp from an [`OffsetDateTime`].
    #[must_use]
    pub const fn new(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Creates a timestamp from unix epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`time::error::ComponentRange`] when the value is outside the
    /// representable range.
    pub fn from_unix_millis(millis: i64) -> Result<Self, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map(Self)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Nanoseconds divided by one million always fit in an i64 for representable dates."
    )]
    pub const fn unix_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Returns the underlying [`OffsetDateTime`].
    #[must_use]
    pub const fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the whole milliseconds elapsed since `earlier`.
    ///
    /// Negative when `earlier` is in the future relative to `self`.
    #[must_use]
    pub const fn millis_since(&self, earlier: Self) -> i64 {
        self.unix_millis() - earlier.unix_millis()
    }

    /// Returns true when at least `duration` has elapsed since `earlier`.
    #[must_use]
    pub fn elapsed_at_least(&self, earlier: Self, duration: DurationMillis) -> bool {
        let elapsed = self.millis_since(earlier);
        elapsed >= 0 && u64::try_from(elapsed).is_ok_and(|value| value >= duration.get())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&time::format_description::well_known::Rfc3339) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}", self.unix_millis()),
        }
    }
}

// ============================================================================
// SECTION: Duration
// ============================================================================

/// Millisecond duration used in records and configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DurationMillis(u64);

impl DurationMillis {
    /// Creates a duration from milliseconds.
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a duration from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000)
    }

    /// Creates a duration from whole minutes.
    #[must_use]
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes * 60_000)
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the duration as a [`std::time::Duration`].
    #[must_use]
    pub const fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl fmt::Display for DurationMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
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

    use super::DurationMillis;
    use super::Timestamp;

    #[test]
    fn unix_millis_round_trips() {
        let ts = Timestamp::from_unix_millis(1_750_000_000_123).expect("in range");
        assert_eq!(ts.unix_millis(), 1_750_000_000_123);
    }

    #[test]
    fn serializes_as_rfc3339() {
        let ts = Timestamp::from_unix_millis(0).expect("in range");
        let json = serde_json::to_string(&ts).expect("serialize");
        assert_eq!(json, "\"1970-01-01T00:00:00Z\"");
    }

    #[test]
    fn elapsed_at_least_handles_boundaries() {
        let start = Timestamp::from_unix_millis(10_000).expect("in range");
        let later = Timestamp::from_unix_millis(10_500).expect("in range");
        assert!(later.elapsed_at_least(start, DurationMillis::new(500)));
        assert!(!later.elapsed_at_least(start, DurationMillis::new(501)));
        assert!(!start.elapsed_at_least(later, DurationMillis::new(1)));
    }
}
