// tag-logic/tests/roundtrip.rs
// ============================================================================
// Module: Round-Trip Tests
// Description: Canonical printer / parser round-trip properties.
// Purpose: Ensure parse -> print -> parse yields the identical AST.
// ============================================================================
//! ## Overview
//! Property tests generating arbitrary expression trees, printing them in
//! canonical form, and reparsing. The trees must compare equal, including
//! explicit grouping that precedence alone would not reproduce.

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

use proptest::prelude::Just;
use proptest::prelude::Strategy;
use proptest::prop_oneof;
use proptest::proptest;
use tag_logic::TagExpr;
use tag_logic::parse_query;

// ============================================================================
// SECTION: Strategies
// ============================================================================

/// Strategy for query identifier components without wildcards.
fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,7}"
}

/// Strategy for match patterns, occasionally containing a wildcard.
fn pattern() -> impl Strategy<Value = String> {
    prop_oneof![
        ident(),
        ident().prop_map(|value| format!("{value}-*")),
        ident().prop_map(|value| format!("*-{value}")),
        Just("*".to_string()),
    ]
}

/// Strategy for arbitrary expression trees in canonical form.
fn expr() -> impl Strategy<Value = TagExpr> {
    let leaf = (ident(), pattern()).prop_map(|(key, pattern)| TagExpr::matches(key, &pattern));
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 2..4).prop_map(TagExpr::and),
            proptest::collection::vec(inner.clone(), 2..4).prop_map(TagExpr::or),
            inner.prop_map(TagExpr::negate),
        ]
    })
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn print_then_parse_is_identity(expr in expr()) {
        let printed = expr.to_string();
        let reparsed = parse_query(&printed)
            .unwrap_or_else(|err| panic!("canonical form failed to parse: {printed:?}: {err}"));
        assert_eq!(reparsed, expr, "round trip changed the tree for {printed:?}");
    }
}

// ============================================================================
// SECTION: Fixed Cases
// ============================================================================

#[test]
fn parse_print_parse_preserves_source_grouping() {
    let source = "(a=1 AND b=2) AND (c=3 OR NOT d=4)";
    let first = parse_query(source).expect("source parses");
    let printed = first.to_string();
    let second = parse_query(&printed).expect("printed form parses");
    assert_eq!(first, second);
}

#[test]
fn printing_normalizes_keyword_case_and_whitespace() {
    let first = parse_query("a=1 and not b=2").expect("parses");
    assert_eq!(first.to_string(), "a=1 AND (NOT b=2)");
}
