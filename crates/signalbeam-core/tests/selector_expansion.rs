// signalbeam-core/tests/selector_expansion.rs
// ============================================================================
// Module: Selector Tests
// Description: Target selector expansion and dynamic-group freezing.
// Purpose: Ensure every selector path yields the same deterministic
// ordering and that in-flight rollouts ignore membership shifts.
// ============================================================================
//! ## Overview
//! Integration tests for selector expansion over the in-memory directory,
//! including the frozen-target-set behavior for dynamic groups.

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

use signalbeam_core::DeploymentStatus;
use signalbeam_core::DeviceRecord;
use signalbeam_core::GroupId;
use signalbeam_core::GroupMembership;
use signalbeam_core::ReportOutcome;
use signalbeam_core::RolloutId;
use signalbeam_core::RolloutStore;
use signalbeam_core::SelectorError;
use signalbeam_core::TargetSelector;
use signalbeam_core::core::group::DeviceGroup;
use signalbeam_core::core::group::GroupType;
use signalbeam_core::expand_selector;
use support::Fixture;
use support::ts;
use tag_logic::TagSet;

// ============================================================================
// SECTION: Expansion Paths
// ============================================================================

#[test]
fn all_paths_return_lexicographic_order() {
    let fixture = Fixture::new();
    let tagged = fixture.add_devices(5, &["location=warehouse-seattle"]);
    let untagged = fixture.add_devices(3, &["location=depot-portland"]);

    let all =
        expand_selector(&fixture.directory, fixture.tenant, &TargetSelector::AllDevices)
            .expect("all");
    let mut expected: Vec<_> = tagged.iter().chain(untagged.iter()).copied().collect();
    expected.sort();
    assert_eq!(all, expected);

    let by_query = expand_selector(
        &fixture.directory,
        fixture.tenant,
        &TargetSelector::TagQuery {
            query: "location=warehouse-*".to_string(),
        },
    )
    .expect("query");
    assert_eq!(by_query, tagged);

    let mut shuffled = tagged.clone();
    shuffled.reverse();
    shuffled.push(tagged[0]);
    let literal = expand_selector(
        &fixture.directory,
        fixture.tenant,
        &TargetSelector::DeviceIds {
            device_ids: shuffled,
        },
    )
    .expect("literal");
    assert_eq!(literal, tagged, "duplicates removed, order restored");
}

#[test]
fn static_groups_expand_stored_memberships() {
    let fixture = Fixture::new();
    let devices = fixture.add_devices(4, &[]);
    let group_id = GroupId::random();
    fixture
        .directory
        .add_group(DeviceGroup {
            group_id,
            tenant_id: fixture.tenant,
            name: "pilot".to_string(),
            group_type: GroupType::Static,
            tag_query: None,
            created_at: ts(0),
        })
        .expect("group");
    for device in devices.iter().take(2) {
        fixture
            .directory
            .add_membership(GroupMembership {
                group_id,
                device_id: *device,
                added_at: ts(0),
                added_by: "ops@example.com".to_string(),
            })
            .expect("membership");
    }

    let members = expand_selector(
        &fixture.directory,
        fixture.tenant,
        &TargetSelector::Group {
            group_id,
        },
    )
    .expect("static members");
    assert_eq!(members, devices[..2].to_vec());
}

#[test]
fn invalid_queries_surface_parse_errors() {
    let fixture = Fixture::new();
    fixture.add_devices(1, &[]);
    let err = expand_selector(
        &fixture.directory,
        fixture.tenant,
        &TargetSelector::TagQuery {
            query: "location=".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, SelectorError::InvalidQuery(_)));
}

// ============================================================================
// SECTION: Frozen Target Sets
// ============================================================================

#[test]
fn dynamic_group_membership_shifts_do_not_touch_inflight_rollouts() {
    let fixture = Fixture::new();
    let original = fixture.add_devices(10, &["location=warehouse-1"]);

    let group_id = GroupId::random();
    fixture
        .directory
        .add_group(DeviceGroup {
            group_id,
            tenant_id: fixture.tenant,
            name: "warehouse".to_string(),
            group_type: GroupType::Dynamic,
            tag_query: Some("location=warehouse-*".to_string()),
            created_at: ts(0),
        })
        .expect("group");

    let rollout_id = RolloutId::random();
    let mut request = fixture.request(rollout_id, &[("all", 100.0)]);
    request.selector = TargetSelector::Group {
        group_id,
    };
    let aggregate = fixture.planner().plan(&request, ts(0)).expect("plan");
    assert_eq!(aggregate.assignment_count(), 10);

    let executor = fixture.executor();
    executor.start(rollout_id, ts(1_000)).expect("start");

    // An eleventh device gains a matching tag mid-flight.
    let late_arrival = signalbeam_core::DeviceId::random();
    fixture
        .directory
        .add_device(DeviceRecord {
            device_id: late_arrival,
            tenant_id: fixture.tenant,
            tags: TagSet::from_raw(["location=warehouse-5"]),
            group_id: None,
            assigned_bundle_id: None,
            deployment_status: DeploymentStatus::Pending,
        })
        .expect("device");

    // The group now matches eleven devices...
    let members = expand_selector(
        &fixture.directory,
        fixture.tenant,
        &TargetSelector::Group {
            group_id,
        },
    )
    .expect("members");
    assert_eq!(members.len(), 11);

    // ...but the in-flight rollout keeps its frozen set of ten.
    let loaded = fixture.store.load_rollout(rollout_id).expect("load").expect("present");
    assert_eq!(loaded.aggregate.assignment_count(), 10);
    assert!(
        !loaded
            .aggregate
            .phases
            .iter()
            .flat_map(|phase| phase.assignments.iter())
            .any(|assignment| assignment.device_id == late_arrival)
    );

    // The late arrival has no active assignment either.
    let report = fixture.report(late_arrival, DeploymentStatus::Succeeded, Some("2.0.0"), ts(2_000));
    let outcome = executor.record_report(fixture.tenant, &report, ts(2_000)).expect("report");
    assert_eq!(outcome, ReportOutcome::NoActiveAssignment);

    // Ten devices were dispatched; the late arrival was not.
    assert_eq!(original.len(), 10);
    assert_eq!(fixture.subject_count("device.desired-state-changed"), 10);
}
