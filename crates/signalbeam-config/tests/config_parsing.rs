// signalbeam-config/tests/config_parsing.rs
// ============================================================================
// Module: Config Tests
// Description: Parsing, defaults, and range validation.
// Purpose: Ensure the configuration surface carries its documented
// defaults and fails closed on invalid values.
// ============================================================================
//! ## Overview
//! Integration tests for TOML parsing and validation of the SignalBeam
//! configuration.

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

use std::io::Write;

use signalbeam_config::ConfigError;
use signalbeam_config::SignalBeamConfig;

#[test]
fn defaults_match_the_documented_surface() {
    let config = SignalBeamConfig::default();
    assert_eq!(config.reconcile.tick_interval_ms, 30_000);
    assert_eq!(config.reconcile.tick_deadline_ms, 30_000);
    assert_eq!(config.assignment.max_retries, 3);
    assert_eq!(config.assignment.heartbeat_deadline_ms, 15 * 60_000);
    assert_eq!(config.rollout.default_failure_threshold, 0.05);
    assert_eq!(config.rollout.stall_alert_after_ms, 24 * 60 * 60_000);
    assert!(config.validate().is_ok());
}

#[test]
fn partial_toml_overrides_merge_with_defaults() {
    let config = SignalBeamConfig::from_toml(
        r#"
        [reconcile]
        tick_interval_ms = 10000

        [assignment]
        max_retries = 5
        "#,
    )
    .expect("config parses");
    assert_eq!(config.reconcile.tick_interval_ms, 10_000);
    assert_eq!(config.reconcile.tick_deadline_ms, 30_000);
    assert_eq!(config.assignment.max_retries, 5);
    assert_eq!(config.assignment.heartbeat_deadline_ms, 15 * 60_000);
}

#[test]
fn executor_and_planner_configs_derive_from_the_surface() {
    let config = SignalBeamConfig::from_toml(
        r#"
        [assignment]
        max_retries = 4
        heartbeat_deadline_ms = 120000

        [rollout]
        default_failure_threshold = 0.2
        "#,
    )
    .expect("config parses");

    let executor = config.executor_config();
    assert_eq!(executor.max_assignment_retries, 4);
    assert_eq!(executor.heartbeat_deadline.get(), 120_000);

    let planner = config.planner_config();
    assert_eq!(planner.default_failure_threshold, 0.2);
}

#[test]
fn out_of_range_values_fail_closed() {
    let too_fast = SignalBeamConfig::from_toml("[reconcile]\ntick_interval_ms = 10");
    assert!(matches!(
        too_fast,
        Err(ConfigError::Invalid {
            field: "reconcile.tick_interval_ms",
            ..
        })
    ));

    let bad_threshold =
        SignalBeamConfig::from_toml("[rollout]\ndefault_failure_threshold = 1.5");
    assert!(matches!(
        bad_threshold,
        Err(ConfigError::Invalid {
            field: "rollout.default_failure_threshold",
            ..
        })
    ));

    let zero_retries = SignalBeamConfig::from_toml("[assignment]\nmax_retries = 0");
    assert!(matches!(
        zero_retries,
        Err(ConfigError::Invalid {
            field: "assignment.max_retries",
            ..
        })
    ));

    let inverted_backoff = SignalBeamConfig::from_toml(
        "[executor]\nbackoff_initial_ms = 5000\nbackoff_ceiling_ms = 100",
    );
    assert!(matches!(
        inverted_backoff,
        Err(ConfigError::Invalid {
            field: "executor.backoff_ceiling_ms",
            ..
        })
    ));
}

#[test]
fn unparseable_toml_is_rejected() {
    assert!(matches!(
        SignalBeamConfig::from_toml("not valid toml ["),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn missing_files_load_defaults_and_real_files_load_values() {
    let missing = SignalBeamConfig::load(Some(std::path::Path::new(
        "/nonexistent/signalbeam.toml",
    )))
    .expect("defaults");
    assert_eq!(missing.reconcile.tick_interval_ms, 30_000);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("signalbeam.toml");
    let mut file = std::fs::File::create(&path).expect("create");
    writeln!(file, "[reconcile]\ntick_interval_ms = 5000").expect("write");
    drop(file);

    let loaded = SignalBeamConfig::load(Some(&path)).expect("load");
    assert_eq!(loaded.reconcile.tick_interval_ms, 5_000);
}
