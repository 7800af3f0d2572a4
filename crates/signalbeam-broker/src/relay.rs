// signalbeam-broker/src/relay.rs
// ============================================================================
// Module: Outbox Relay
// Description: Publishes stored outbox rows to the bus at-least-once.
// Purpose: Drain unpublished rows in sequence order and mark them after
// delivery.
// Dependencies: signalbeam-core, tokio, tracing, thiserror
// ============================================================================

//! ## Overview
//! The relay polls the outbox for unpublished rows, publishes them in
//! sequence order, and marks each row only after the sink accepted it. A
//! crash between publish and mark replays the row, which is the
//! at-least-once contract; per-subject ordering holds because rows are
//! drained strictly by sequence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use signalbeam_core::Classify;
use signalbeam_core::ErrorClass;
use signalbeam_core::OutboxStore;
use signalbeam_core::StoreError;
use thiserror::Error;
use tokio::sync::watch;

use crate::sink::EventSink;
use crate::sink::SinkError;

// ============================================================================
// SECTION: Relay Configuration
// ============================================================================

/// Outbox relay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Rows fetched per drain.
    pub batch_size: usize,
    /// Poll interval between drains.
    pub poll_interval: Duration,
    /// Initial backoff after a failed drain.
    pub backoff_initial: Duration,
    /// Backoff ceiling.
    pub backoff_ceiling: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            poll_interval: Duration::from_millis(1_000),
            backoff_initial: Duration::from_millis(500),
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Relay Errors
// ============================================================================

/// Errors produced while draining the outbox.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbox store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The sink failed to deliver a row.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl Classify for RelayError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Store(err) => err.class(),
            Self::Sink(SinkError::Unavailable(_)) => ErrorClass::Transient,
            Self::Sink(SinkError::Rejected(_)) => ErrorClass::Fatal,
        }
    }
}

// ============================================================================
// SECTION: Outbox Relay
// ============================================================================

/// Relay between the transactional outbox and an event sink.
pub struct OutboxRelay<S, K> {
    /// Outbox store.
    store: S,
    /// Delivery sink.
    sink: K,
    /// Relay configuration.
    config: RelayConfig,
}

impl<S, K> OutboxRelay<S, K>
where
    S: OutboxStore + Send + Sync,
    K: EventSink,
{
    /// Creates a relay.
    pub const fn new(store: S, sink: K, config: RelayConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Drains one batch: publishes rows in sequence order and marks each
    /// row after the sink accepted it. Returns the number of published
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] on the first store or sink failure; rows
    /// already marked stay marked.
    pub async fn drain_once(&self) -> Result<usize, RelayError> {
        let entries = self.store.fetch_unpublished(self.config.batch_size)?;
        let mut published = 0usize;
        for entry in entries {
            self.sink.publish(&entry.subject, &entry.payload).await?;
            self.store.mark_published(&[entry.seq])?;
            published += 1;
        }
        Ok(published)
    }

    /// Runs the relay loop until the shutdown signal flips to true.
    ///
    /// Failed drains back off exponentially up to the ceiling; successful
    /// drains return to the regular poll interval.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut delay = self.config.poll_interval;
        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.drain_once().await {
                Ok(published) => {
                    if published > 0 {
                        tracing::debug!(published, "outbox drained");
                    }
                    delay = self.config.poll_interval;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "outbox drain failed");
                    delay = next_backoff(
                        delay,
                        self.config.backoff_initial,
                        self.config.backoff_ceiling,
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Doubles the delay toward the ceiling, starting from the initial value.
fn next_backoff(current: Duration, initial: Duration, ceiling: Duration) -> Duration {
    let doubled = current.max(initial).saturating_mul(2);
    doubled.min(ceiling)
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

    use super::next_backoff;

    #[test]
    fn backoff_doubles_toward_the_ceiling() {
        let initial = Duration::from_millis(500);
        let ceiling = Duration::from_secs(4);
        let first = next_backoff(Duration::from_millis(100), initial, ceiling);
        assert_eq!(first, Duration::from_millis(1_000));
        let second = next_backoff(first, initial, ceiling);
        assert_eq!(second, Duration::from_millis(2_000));
        let third = next_backoff(second, initial, ceiling);
        assert_eq!(third, Duration::from_secs(4));
        let capped = next_backoff(third, initial, ceiling);
        assert_eq!(capped, ceiling);
    }
}
