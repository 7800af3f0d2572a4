// signalbeam-core/tests/alert_engine.rs
// ============================================================================
// Module: Alert Engine Tests
// Description: Deduplication and lifecycle coverage.
// Purpose: Ensure one active alert per key, refresh semantics, and
// re-opening after resolution.
// ============================================================================
//! ## Overview
//! Integration tests for the deduplicating alert engine over the in-memory
//! alert store.

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

mod support;

use signalbeam_core::AlertEngine;
use signalbeam_core::AlertEngineError;
use signalbeam_core::AlertOutcome;
use signalbeam_core::AlertSignal;
use signalbeam_core::AlertStore;
use signalbeam_core::MemoryAlertStore;
use signalbeam_core::RolloutId;
use signalbeam_core::TenantId;
use signalbeam_core::Timestamp;
use signalbeam_core::core::alert::AlertSeverity;
use signalbeam_core::core::alert::AlertStatus;
use signalbeam_core::core::alert::AlertType;
use support::ts;

/// Builds a rollout-scoped signal.
fn signal(tenant: TenantId, rollout: RolloutId, at: Timestamp) -> AlertSignal {
    AlertSignal {
        tenant_id: tenant,
        alert_type: AlertType::RolloutFailed,
        severity: AlertSeverity::Critical,
        title: "Rollout rolled back".to_string(),
        description: "threshold breach".to_string(),
        device_id: None,
        rollout_id: Some(rollout),
        observed_at: at,
    }
}

#[test]
fn duplicate_signals_refresh_instead_of_raising() {
    let store = MemoryAlertStore::new();
    let engine = AlertEngine::new(store.clone());
    let tenant = TenantId::random();
    let rollout = RolloutId::random();

    let first = engine.observe(&signal(tenant, rollout, ts(0))).expect("observe");
    let AlertOutcome::Raised(alert_id) = first else {
        panic!("expected a raised alert, got {first:?}");
    };

    let second = engine.observe(&signal(tenant, rollout, ts(5_000))).expect("observe");
    assert_eq!(second, AlertOutcome::Refreshed(alert_id));

    let alert = store.load(alert_id).expect("load").expect("present");
    assert_eq!(alert.last_seen_at, ts(5_000));
    assert_eq!(alert.created_at, ts(0));
    assert_eq!(store.list_open(tenant).expect("list").len(), 1);

    // Exactly one raised event despite two signals.
    let events = store.events().expect("events");
    assert_eq!(events.len(), 1);
}

#[test]
fn distinct_keys_raise_distinct_alerts() {
    let store = MemoryAlertStore::new();
    let engine = AlertEngine::new(store.clone());
    let tenant = TenantId::random();

    engine.observe(&signal(tenant, RolloutId::random(), ts(0))).expect("observe");
    engine.observe(&signal(tenant, RolloutId::random(), ts(1))).expect("observe");
    assert_eq!(store.list_open(tenant).expect("list").len(), 2);
}

#[test]
fn lifecycle_runs_active_acknowledged_resolved() {
    let store = MemoryAlertStore::new();
    let engine = AlertEngine::new(store.clone());
    let tenant = TenantId::random();
    let rollout = RolloutId::random();

    let outcome = engine.observe(&signal(tenant, rollout, ts(0))).expect("observe");
    let alert_id = outcome.alert_id();

    let acknowledged =
        engine.acknowledge(alert_id, "oncall@example.com", ts(1_000)).expect("acknowledge");
    assert_eq!(acknowledged.status, AlertStatus::Acknowledged);
    assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("oncall@example.com"));

    // Double acknowledgement is rejected.
    assert!(matches!(
        engine.acknowledge(alert_id, "other@example.com", ts(2_000)),
        Err(AlertEngineError::InvalidTransition { .. })
    ));

    let resolved = engine.resolve(alert_id, ts(3_000)).expect("resolve");
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(matches!(
        engine.resolve(alert_id, ts(4_000)),
        Err(AlertEngineError::InvalidTransition { .. })
    ));

    let events = store.events().expect("events");
    let subjects: Vec<&str> = events.iter().map(|event| event.subject()).collect();
    assert_eq!(subjects, vec!["alert.raised", "alert.acknowledged", "alert.resolved"]);
}

#[test]
fn resolved_keys_reopen_as_new_alerts() {
    let store = MemoryAlertStore::new();
    let engine = AlertEngine::new(store.clone());
    let tenant = TenantId::random();
    let rollout = RolloutId::random();

    let first = engine.observe(&signal(tenant, rollout, ts(0))).expect("observe").alert_id();
    engine.resolve(first, ts(1_000)).expect("resolve");

    let second = engine.observe(&signal(tenant, rollout, ts(2_000))).expect("observe");
    let AlertOutcome::Raised(second_id) = second else {
        panic!("expected a fresh alert after resolution, got {second:?}");
    };
    assert_ne!(first, second_id);
}
