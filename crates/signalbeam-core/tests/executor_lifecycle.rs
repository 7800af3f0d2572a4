// signalbeam-core/tests/executor_lifecycle.rs
// ============================================================================
// Module: Executor Tests
// Description: Rollout state machine coverage.
// Purpose: Exercise advancement, rollback, pause, retries, heartbeats, and
// the boundary thresholds.
// ============================================================================
//! ## Overview
//! Integration tests driving whole rollouts through the executor with the
//! in-memory store: the happy path, auto-rollback on threshold breach,
//! pause/resume, failed-assignment retries, soak gating, heartbeat
//! deadlines, stall signals, and tick idempotence.

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
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod support;

use signalbeam_core::AlertType;
use signalbeam_core::AssignmentStatus;
use signalbeam_core::DeploymentStatus;
use signalbeam_core::DesiredStateStore;
use signalbeam_core::DeviceId;
use signalbeam_core::DurationMillis;
use signalbeam_core::ExecutorConfig;
use signalbeam_core::ExecutorError;
use signalbeam_core::MemoryStore;
use signalbeam_core::PhaseStatus;
use signalbeam_core::ReportOutcome;
use signalbeam_core::RolloutAggregate;
use signalbeam_core::RolloutExecutor;
use signalbeam_core::RolloutId;
use signalbeam_core::RolloutStatus;
use signalbeam_core::RolloutStore;
use signalbeam_core::Timestamp;
use support::Fixture;
use support::ts;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads the aggregate fresh from the store.
fn reload(store: &MemoryStore, rollout_id: RolloutId) -> RolloutAggregate {
    store.load_rollout(rollout_id).expect("load").expect("present").aggregate
}

/// Devices of the phase with the given 1-based number.
fn phase_devices(aggregate: &RolloutAggregate, number: u32) -> Vec<DeviceId> {
    aggregate.phases[number as usize - 1]
        .assignments
        .iter()
        .map(|assignment| assignment.device_id)
        .collect()
}

/// Reports success for each device and ticks once.
fn succeed_devices(
    fixture: &Fixture,
    executor: &RolloutExecutor<MemoryStore>,
    devices: &[DeviceId],
    now: Timestamp,
) {
    for device in devices {
        let report = fixture.report(*device, DeploymentStatus::Succeeded, Some("2.0.0"), now);
        let outcome = executor.record_report(fixture.tenant, &report, now).expect("report");
        assert!(matches!(
            outcome,
            ReportOutcome::Applied {
                assignment_status: AssignmentStatus::Succeeded,
                ..
            }
        ));
    }
}

// ============================================================================
// SECTION: Happy Path (three phases)
// ============================================================================

#[test]
fn hundred_devices_complete_through_three_phases() {
    let fixture = Fixture::new();
    fixture.add_devices(100, &["environment=production"]);
    let rollout_id = RolloutId::random();
    let request =
        fixture.request(rollout_id, &[("canary", 10.0), ("half", 50.0), ("fleet", 100.0)]);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");

    let aggregate = reload(&fixture.store, rollout_id);
    assert_eq!(aggregate.rollout.status, RolloutStatus::InProgress);
    assert_eq!(aggregate.rollout.current_phase_number, 1);
    assert_eq!(aggregate.phases[0].phase.status, PhaseStatus::InProgress);

    // Phase 1: 10 devices, phase 2: 40, phase 3: 50.
    for (phase_number, offset) in [(1u32, 10_000i64), (2, 20_000), (3, 30_000)] {
        let aggregate = reload(&fixture.store, rollout_id);
        let devices = phase_devices(&aggregate, phase_number);
        succeed_devices(&fixture, &executor, &devices, ts(offset));
        let report = executor.reconcile_tick(rollout_id, ts(offset + 1_000)).expect("tick");
        assert!(report.changed, "phase {phase_number} should advance");
    }

    let finished = reload(&fixture.store, rollout_id);
    assert_eq!(finished.rollout.status, RolloutStatus::Completed);
    assert_eq!(finished.rollout.current_phase_number, 4);
    assert!(finished.phases.iter().all(|phase| phase.phase.status == PhaseStatus::Completed));
    // Phases completed in ascending order with rates under the threshold.
    assert!(finished.phases.iter().all(|phase| phase.phase.failure_rate() <= 0.05));

    // Every device converged on the target version.
    for state in &finished.phases {
        for assignment in &state.assignments {
            let desired = fixture
                .store
                .read(fixture.tenant, assignment.device_id)
                .expect("read")
                .expect("desired state");
            assert_eq!(desired.bundle_version.as_str(), "2.0.0");
        }
    }

    assert_eq!(fixture.subject_count("rollout.started"), 1);
    assert_eq!(fixture.subject_count("rollout.phase-advanced"), 2);
    assert_eq!(fixture.subject_count("rollout.completed"), 1);
    assert_eq!(fixture.subject_count("device.desired-state-changed"), 100);
}

// ============================================================================
// SECTION: Auto-Rollback (threshold breach)
// ============================================================================

#[test]
fn threshold_breach_rolls_back_and_restores_previous_version() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(20, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(0.10);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");

    for device in devices.iter().take(3) {
        let report = fixture.report(*device, DeploymentStatus::Failed, None, ts(5_000));
        executor.record_report(fixture.tenant, &report, ts(5_000)).expect("report");
    }

    let tick = executor.reconcile_tick(rollout_id, ts(6_000)).expect("tick");
    assert_eq!(tick.status, RolloutStatus::RolledBack);
    assert_eq!(tick.signals.len(), 1);
    assert_eq!(tick.signals[0].alert_type, AlertType::RolloutFailed);

    let aggregate = reload(&fixture.store, rollout_id);
    assert_eq!(aggregate.rollout.status, RolloutStatus::RolledBack);
    assert!(aggregate.rollout.completed_at.is_some());

    // Every dispatched device is reset to the previous version.
    for device in &devices {
        let desired =
            fixture.store.read(fixture.tenant, *device).expect("read").expect("desired state");
        assert_eq!(desired.bundle_version.as_str(), "1.0.0");
    }

    assert_eq!(fixture.subject_count("rollout.rolled-back"), 1);
}

#[test]
fn zero_threshold_rolls_back_on_a_single_failure() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(10, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(0.0);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");
    let report = fixture.report(devices[0], DeploymentStatus::Failed, None, ts(2_000));
    executor.record_report(fixture.tenant, &report, ts(2_000)).expect("report");

    let tick = executor.reconcile_tick(rollout_id, ts(3_000)).expect("tick");
    assert_eq!(tick.status, RolloutStatus::RolledBack);
}

#[test]
fn full_threshold_never_rolls_back() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(4, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(1.0);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");
    for device in &devices {
        let report = fixture.report(*device, DeploymentStatus::Failed, None, ts(2_000));
        executor.record_report(fixture.tenant, &report, ts(2_000)).expect("report");
    }

    // All devices failed (rate 1.0), yet the phase completes.
    let tick = executor.reconcile_tick(rollout_id, ts(3_000)).expect("tick");
    assert_eq!(tick.status, RolloutStatus::Completed);
}

// ============================================================================
// SECTION: Pause and Resume
// ============================================================================

#[test]
fn paused_rollouts_apply_reports_but_never_advance() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(4, &[]);
    let rollout_id = RolloutId::random();
    fixture.planner().plan(&fixture.request(rollout_id, &[("all", 100.0)]), ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");
    executor.pause(rollout_id, ts(2_000)).expect("pause");

    // Per-device progress continues while paused.
    succeed_devices(&fixture, &executor, &devices, ts(3_000));

    let paused_tick = executor.reconcile_tick(rollout_id, ts(4_000)).expect("tick");
    assert!(!paused_tick.changed, "paused rollouts must not advance");
    assert_eq!(reload(&fixture.store, rollout_id).rollout.status, RolloutStatus::Paused);

    // Resume, then advancement happens immediately.
    executor.resume(rollout_id, ts(5_000)).expect("resume");
    let tick = executor.reconcile_tick(rollout_id, ts(5_001)).expect("tick");
    assert!(tick.changed);
    assert_eq!(tick.status, RolloutStatus::Completed);
}

#[test]
fn lifecycle_guards_reject_wrong_states() {
    let fixture = Fixture::new();
    fixture.add_devices(2, &[]);
    let rollout_id = RolloutId::random();
    fixture.planner().plan(&fixture.request(rollout_id, &[("all", 100.0)]), ts(0)).expect("plan");

    let executor = fixture.executor();
    assert!(matches!(
        executor.pause(rollout_id, ts(1)),
        Err(ExecutorError::InvalidTransition { .. })
    ));
    executor.start(rollout_id, ts(2)).expect("start");
    assert!(matches!(
        executor.start(rollout_id, ts(3)),
        Err(ExecutorError::InvalidTransition { .. })
    ));
    assert!(matches!(
        executor.resume(rollout_id, ts(4)),
        Err(ExecutorError::InvalidTransition { .. })
    ));
}

// ============================================================================
// SECTION: Retry of Failed Assignments
// ============================================================================

#[test]
fn failed_assignments_retry_until_the_limit() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(2, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(1.0);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");

    let device = devices[0];
    let fail = |at: Timestamp| {
        let report = fixture.report(device, DeploymentStatus::Failed, None, at);
        executor.record_report(fixture.tenant, &report, at).expect("report");
    };

    // First failure: one failed attempt recorded.
    fail(ts(2_000));
    let find = |aggregate: &RolloutAggregate| {
        aggregate.phases[0]
            .assignments
            .iter()
            .find(|assignment| assignment.device_id == device)
            .cloned()
            .expect("assignment")
    };
    let assignment = find(&reload(&fixture.store, rollout_id));
    assert_eq!(assignment.status, AssignmentStatus::Failed);
    assert_eq!(assignment.retry_count, 1);

    // Operator retry: back to reconciling, desired state re-asserted.
    executor.retry_assignment(rollout_id, device, ts(3_000)).expect("retry");
    let assignment = find(&reload(&fixture.store, rollout_id));
    assert_eq!(assignment.status, AssignmentStatus::Reconciling);
    assert_eq!(assignment.retry_count, 2);
    assert!(assignment.error_message.is_none());
    let desired = fixture.store.read(fixture.tenant, device).expect("read").expect("state");
    assert_eq!(desired.bundle_version.as_str(), "2.0.0");

    // Second failure reaches the limit; the retry budget is spent.
    fail(ts(4_000));
    let assignment = find(&reload(&fixture.store, rollout_id));
    assert_eq!(assignment.status, AssignmentStatus::Failed);
    assert_eq!(assignment.retry_count, 3);
    assert!(matches!(
        executor.retry_assignment(rollout_id, device, ts(5_000)),
        Err(ExecutorError::RetryLimitReached { .. })
    ));

    // The terminal failure counts toward the phase failure rate.
    let aggregate = reload(&fixture.store, rollout_id);
    assert_eq!(aggregate.phases[0].phase.failure_count, 1);
}

// ============================================================================
// SECTION: Soak, Heartbeats, Stalls
// ============================================================================

#[test]
fn min_healthy_duration_gates_advancement() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(2, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.phases[0].min_healthy_duration = Some(DurationMillis::from_minutes(10));
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");
    succeed_devices(&fixture, &executor, &devices, ts(1_000));

    let early = executor.reconcile_tick(rollout_id, ts(60_000)).expect("tick");
    assert!(!early.changed, "soak time has not elapsed");

    let late = executor.reconcile_tick(rollout_id, ts(11 * 60_000)).expect("tick");
    assert!(late.changed);
    assert_eq!(late.status, RolloutStatus::Completed);
}

#[test]
fn silent_reconciling_devices_fail_on_heartbeat_deadline() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(1, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(1.0);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");

    // The device acknowledges, then goes silent.
    let report = fixture.report(devices[0], DeploymentStatus::Reconciling, None, ts(1_000));
    executor.record_report(fixture.tenant, &report, ts(1_000)).expect("report");

    let before = executor.reconcile_tick(rollout_id, ts(10 * 60_000)).expect("tick");
    assert!(!before.changed, "deadline not reached yet");

    let after = executor.reconcile_tick(rollout_id, ts(17 * 60_000)).expect("tick");
    assert!(after.changed);
    let aggregate = reload(&fixture.store, rollout_id);
    let assignment = &aggregate.phases[0].assignments[0];
    assert_eq!(aggregate.rollout.status, RolloutStatus::Completed);
    assert_eq!(aggregate.phases[0].phase.failure_count, 1);
    assert_eq!(assignment.error_message.as_deref(), Some("heartbeat deadline exceeded"));
}

#[test]
fn stalled_phases_raise_a_warning_signal() {
    let fixture = Fixture::new();
    fixture.add_devices(2, &[]);
    let rollout_id = RolloutId::random();
    fixture.planner().plan(&fixture.request(rollout_id, &[("all", 100.0)]), ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");

    // Devices never acknowledge; 25 hours later the phase is stalled.
    let tick = executor.reconcile_tick(rollout_id, ts(25 * 60 * 60_000)).expect("tick");
    assert!(!tick.changed);
    assert!(tick.signals.iter().any(|signal| signal.alert_type == AlertType::RolloutStalled));
}

#[test]
fn high_failure_rate_warns_before_the_threshold_trips() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(10, &[]);
    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.failure_threshold = Some(0.5);
    fixture.planner().plan(&request, ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");

    // 3 failures and 7 successes: rate 0.3 crosses half of 0.5 without
    // breaching it.
    for device in devices.iter().take(3) {
        let report = fixture.report(*device, DeploymentStatus::Failed, None, ts(1_000));
        executor.record_report(fixture.tenant, &report, ts(1_000)).expect("report");
    }
    for device in devices.iter().skip(3) {
        let report =
            fixture.report(*device, DeploymentStatus::Succeeded, Some("2.0.0"), ts(2_000));
        executor.record_report(fixture.tenant, &report, ts(2_000)).expect("report");
    }

    let tick = executor.reconcile_tick(rollout_id, ts(3_000)).expect("tick");
    assert!(tick.signals.iter().any(|signal| signal.alert_type == AlertType::HighFailureRate));
    assert_eq!(tick.status, RolloutStatus::Completed);
}

// ============================================================================
// SECTION: Idempotence and Cancel
// ============================================================================

#[test]
fn quiescent_ticks_commit_nothing() {
    let fixture = Fixture::new();
    fixture.add_devices(3, &[]);
    let rollout_id = RolloutId::random();
    fixture.planner().plan(&fixture.request(rollout_id, &[("all", 100.0)]), ts(0)).expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");

    let version_before =
        fixture.store.load_rollout(rollout_id).expect("load").expect("present").version;
    let events_before = fixture.store.event_subjects().expect("subjects").len();

    let tick = executor.reconcile_tick(rollout_id, ts(1_000)).expect("tick");
    assert!(!tick.changed);

    let version_after =
        fixture.store.load_rollout(rollout_id).expect("load").expect("present").version;
    let events_after = fixture.store.event_subjects().expect("subjects").len();
    assert_eq!(version_before, version_after, "no state may change");
    assert_eq!(events_before, events_after, "no events may be emitted");
}

#[test]
fn cancel_fails_the_rollout_and_skips_open_work() {
    let fixture = Fixture::new();
    fixture.add_devices(4, &[]);
    let rollout_id = RolloutId::random();
    fixture
        .planner()
        .plan(&fixture.request(rollout_id, &[("canary", 50.0), ("all", 100.0)]), ts(0))
        .expect("plan");

    let executor = fixture.executor();
    executor.start(rollout_id, ts(0)).expect("start");
    let report = executor.cancel(rollout_id, ts(1_000)).expect("cancel");
    assert_eq!(report.status, RolloutStatus::Failed);

    let aggregate = reload(&fixture.store, rollout_id);
    assert!(aggregate.phases.iter().all(|phase| phase.phase.status == PhaseStatus::Skipped));
    assert!(
        aggregate
            .phases
            .iter()
            .flat_map(|phase| phase.assignments.iter())
            .all(|assignment| assignment.status == AssignmentStatus::Skipped)
    );
    assert_eq!(fixture.subject_count("rollout.failed"), 1);

    // Terminal statuses are sticky.
    assert!(matches!(
        executor.cancel(rollout_id, ts(2_000)),
        Err(ExecutorError::InvalidTransition { .. })
    ));
}
