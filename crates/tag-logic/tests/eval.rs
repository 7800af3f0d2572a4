// tag-logic/tests/eval.rs
// ============================================================================
// Module: Evaluation Tests
// Description: Query evaluation against device tag sets.
// Purpose: Cover the documented match semantics, including legacy simple
// tags and wildcard patterns.
// ============================================================================
//! ## Overview
//! Integration tests evaluating parsed queries over normalized tag sets.

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

use support::TestResult;
use support::ensure;
use tag_logic::TagSet;
use tag_logic::parse_query;

/// Evaluates a query against raw tags, panicking on parse failure.
fn eval(query: &str, raw_tags: &[&str]) -> bool {
    let tags = TagSet::from_raw(raw_tags.iter().copied());
    parse_query(query).expect("query must parse").evaluate(&tags)
}

// ============================================================================
// SECTION: Reference Device Queries
// ============================================================================

/// Tags of the reference device used across these tests.
const DEVICE: &[&str] = &["environment=production", "location=warehouse-seattle", "hardware=rpi4"];

#[test]
fn literal_match_hits_structured_tag() -> TestResult {
    ensure(eval("environment=production", DEVICE), "Expected literal match")
}

#[test]
fn wildcard_match_hits_prefix() -> TestResult {
    ensure(eval("location=warehouse-*", DEVICE), "Expected wildcard match")
}

#[test]
fn negation_of_absent_value_matches() -> TestResult {
    ensure(eval("NOT environment=dev", DEVICE), "Expected NOT to match")
}

#[test]
fn composite_query_matches_reference_device() -> TestResult {
    ensure(
        eval(
            "(hardware=rpi4 OR hardware=rpi5) AND NOT environment=dev AND location=warehouse-*",
            DEVICE,
        ),
        "Expected composite query to match",
    )
}

#[test]
fn wrong_key_does_not_match_structured_tag() -> TestResult {
    ensure(!eval("location=production", DEVICE), "Expected key mismatch to fail")
}

// ============================================================================
// SECTION: Simple Tag Semantics
// ============================================================================

#[test]
fn simple_tags_match_any_query_key() -> TestResult {
    let legacy = &["production", "rpi4"];
    ensure(
        eval("environment=production", legacy),
        "Expected simple tag to ignore the query key",
    )?;
    ensure(eval("hardware=rpi*", legacy), "Expected wildcard over simple tag")?;
    ensure(!eval("environment=staging", legacy), "Expected value mismatch to fail")
}

// ============================================================================
// SECTION: Robustness
// ============================================================================

#[test]
fn invalid_stored_tags_are_skipped() -> TestResult {
    let noisy = &["environment=production", "bro ken", "=", "ok!"];
    ensure(eval("environment=production", noisy), "Expected valid tag to still match")?;
    ensure(!eval("bro=ken", noisy), "Expected invalid tag to be invisible")
}

#[test]
fn empty_tag_set_matches_only_negations() -> TestResult {
    ensure(!eval("environment=production", &[]), "Expected no match on empty set")?;
    ensure(eval("NOT environment=production", &[]), "Expected NOT to match empty set")
}

#[test]
fn evaluation_is_case_insensitive_end_to_end() -> TestResult {
    let mixed = &["Environment=Production"];
    ensure(eval("ENVIRONMENT=PRODUCTION", mixed), "Expected case-insensitive comparison")
}
