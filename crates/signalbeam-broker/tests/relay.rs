// signalbeam-broker/tests/relay.rs
// ============================================================================
// Module: Relay Tests
// Description: Outbox relay delivery semantics.
// Purpose: Ensure ordered, at-least-once publication with failure
// handling.
// ============================================================================
//! ## Overview
//! Integration tests driving the relay over the in-memory store and sinks,
//! covering ordering, marking, and sink failure behavior.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use signalbeam_broker::EventSink;
use signalbeam_broker::MemorySink;
use signalbeam_broker::OutboxRelay;
use signalbeam_broker::RelayConfig;
use signalbeam_broker::RelayError;
use signalbeam_broker::SinkError;
use signalbeam_core::DesiredStateStore;
use signalbeam_core::DesiredStateWrite;
use signalbeam_core::DeviceId;
use signalbeam_core::DomainEvent;
use signalbeam_core::MemoryStore;
use signalbeam_core::OutboxStore;
use signalbeam_core::SemverVersion;
use signalbeam_core::TenantId;
use signalbeam_core::Timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a fixed-epoch timestamp.
fn ts(offset: i64) -> Timestamp {
    Timestamp::from_unix_millis(1_750_000_000_000 + offset).expect("timestamp")
}

/// Seeds the store outbox with `count` desired-state events.
fn seed_events(store: &MemoryStore, count: usize) {
    let tenant = TenantId::random();
    for index in 0..count {
        let device = DeviceId::random();
        let offset = i64::try_from(index).unwrap_or(0);
        let write = DesiredStateWrite::Assign {
            device_id: device,
            tenant_id: tenant,
            bundle_id: signalbeam_core::BundleId::random(),
            version: SemverVersion::parse("1.0.0").expect("version"),
            assigned_by: "ops@example.com".to_string(),
            assigned_at: ts(offset),
        };
        let event = DomainEvent::DeviceDesiredStateChanged {
            tenant_id: tenant,
            device_id: device,
            bundle_id: None,
            version: None,
            at: ts(offset),
        };
        store.apply_standalone(&[write], &[event]).expect("seed");
    }
}

/// Sink failing every publish until released.
#[derive(Clone, Default)]
struct GatedSink {
    /// When false, publishes fail as unavailable.
    open: Arc<AtomicBool>,
    /// Delegate capturing successful publishes.
    inner: MemorySink,
}

#[async_trait]
impl EventSink for GatedSink {
    async fn publish(&self, subject: &str, payload: &Value) -> Result<(), SinkError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("bus offline".to_string()));
        }
        self.inner.publish(subject, payload).await
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn drain_publishes_in_sequence_order_and_marks_rows() {
    let store = MemoryStore::new();
    seed_events(&store, 5);

    let sink = MemorySink::new();
    let relay = OutboxRelay::new(store.clone(), sink.clone(), RelayConfig::default());

    let published = relay.drain_once().await.expect("drain");
    assert_eq!(published, 5);
    assert!(store.fetch_unpublished(100).expect("fetch").is_empty());

    let subjects: Vec<String> =
        sink.published().into_iter().map(|(subject, _)| subject).collect();
    assert_eq!(subjects, vec!["device.desired-state-changed"; 5]);

    // A second drain is a no-op.
    assert_eq!(relay.drain_once().await.expect("drain"), 0);
}

#[tokio::test]
async fn failed_sinks_leave_rows_unpublished_for_replay() {
    let store = MemoryStore::new();
    seed_events(&store, 3);

    let sink = GatedSink::default();
    let relay = OutboxRelay::new(store.clone(), sink.clone(), RelayConfig::default());

    let err = relay.drain_once().await.unwrap_err();
    assert!(matches!(err, RelayError::Sink(SinkError::Unavailable(_))));
    assert_eq!(store.fetch_unpublished(100).expect("fetch").len(), 3);

    // Once the bus returns, every row is delivered.
    sink.open.store(true, Ordering::SeqCst);
    assert_eq!(relay.drain_once().await.expect("drain"), 3);
    assert!(store.fetch_unpublished(100).expect("fetch").is_empty());
    assert_eq!(sink.inner.published().len(), 3);
}

#[tokio::test]
async fn run_loop_honors_shutdown() {
    let store = MemoryStore::new();
    seed_events(&store, 2);
    let sink = MemorySink::new();
    let relay = OutboxRelay::new(store.clone(), sink.clone(), RelayConfig {
        poll_interval: std::time::Duration::from_millis(10),
        ..RelayConfig::default()
    });

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { relay.run(rx).await });

    // Give the loop a few polls, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tx.send(true).expect("signal shutdown");
    handle.await.expect("relay task joins");

    assert_eq!(sink.published().len(), 2);
    assert!(store.fetch_unpublished(10).expect("fetch").is_empty());
}
