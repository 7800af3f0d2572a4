// tag-logic/tests/parser.rs
// ============================================================================
// Module: Parser Tests
// Description: Grammar coverage for the tag query parser.
// Purpose: Ensure precedence, associativity, and positioned diagnostics.
// ============================================================================
//! ## Overview
//! Integration tests covering the query grammar and its failure modes.

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
use tag_logic::QueryParseError;
use tag_logic::TagExpr;
use tag_logic::parse_query;

// ============================================================================
// SECTION: Grammar Tests
// ============================================================================

#[test]
fn parses_a_single_match() -> TestResult {
    let expr = parse_query("environment=production")?;
    ensure(
        expr == TagExpr::matches("environment", "production"),
        "Expected a single literal match",
    )
}

#[test]
fn parses_wildcard_patterns() -> TestResult {
    let expr = parse_query("location=warehouse-*")?;
    ensure(
        expr == TagExpr::matches("location", "warehouse-*"),
        "Expected a wildcard match",
    )
}

#[test]
fn and_binds_tighter_than_or() -> TestResult {
    let expr = parse_query("a=1 OR b=2 AND c=3")?;
    let expected = TagExpr::or(vec![
        TagExpr::matches("a", "1"),
        TagExpr::and(vec![TagExpr::matches("b", "2"), TagExpr::matches("c", "3")]),
    ]);
    ensure(expr == expected, "Expected AND to bind tighter than OR")
}

#[test]
fn not_is_prefix_and_right_associative() -> TestResult {
    let expr = parse_query("NOT NOT a=1")?;
    let expected = TagExpr::negate(TagExpr::negate(TagExpr::matches("a", "1")));
    ensure(expr == expected, "Expected nested NOT nodes")
}

#[test]
fn not_binds_tighter_than_and() -> TestResult {
    let expr = parse_query("NOT a=1 AND b=2")?;
    let expected = TagExpr::and(vec![
        TagExpr::negate(TagExpr::matches("a", "1")),
        TagExpr::matches("b", "2"),
    ]);
    ensure(expr == expected, "Expected NOT to apply to the left match only")
}

#[test]
fn parentheses_override_precedence() -> TestResult {
    let expr = parse_query("(a=1 OR b=2) AND c=3")?;
    let expected = TagExpr::and(vec![
        TagExpr::or(vec![TagExpr::matches("a", "1"), TagExpr::matches("b", "2")]),
        TagExpr::matches("c", "3"),
    ]);
    ensure(expr == expected, "Expected parenthesized OR under AND")
}

#[test]
fn parentheses_preserve_tree_shape() -> TestResult {
    let nested = parse_query("(a=1 AND b=2) AND c=3")?;
    let flat = parse_query("a=1 AND b=2 AND c=3")?;
    ensure(nested != flat, "Explicit grouping must not be flattened")?;
    let expected = TagExpr::and(vec![
        TagExpr::and(vec![TagExpr::matches("a", "1"), TagExpr::matches("b", "2")]),
        TagExpr::matches("c", "3"),
    ]);
    ensure(nested == expected, "Expected nested AND preserved")
}

#[test]
fn keywords_are_case_insensitive() -> TestResult {
    let lower = parse_query("a=1 and not b=2 or c=3")?;
    let upper = parse_query("A=1 AND NOT B=2 OR C=3")?;
    ensure(lower == upper, "Expected keyword case to be insignificant")
}

#[test]
fn whitespace_is_insignificant() -> TestResult {
    let tight = parse_query("a=1 AND(b=2 OR c=3)")?;
    let spaced = parse_query("  a=1   AND ( b=2  OR   c=3 ) ")?;
    ensure(tight == spaced, "Expected whitespace to be insignificant")
}

#[test]
fn keywords_may_appear_as_match_values() -> TestResult {
    let expr = parse_query("mode=or")?;
    ensure(expr == TagExpr::matches("mode", "or"), "Expected keyword lexeme as value")
}

// ============================================================================
// SECTION: Diagnostics Tests
// ============================================================================

#[test]
fn rejects_empty_input() -> TestResult {
    ensure(parse_query("") == Err(QueryParseError::Empty), "Expected Empty")?;
    ensure(parse_query("   ") == Err(QueryParseError::Empty), "Expected Empty for whitespace")
}

#[test]
fn rejects_unexpected_characters_with_position() -> TestResult {
    let err = parse_query("a=1 && b=2").unwrap_err();
    ensure(
        err == QueryParseError::UnexpectedCharacter {
            pos: 4,
            character: '&',
        },
        format!("Unexpected diagnostic: {err:?}"),
    )
}

#[test]
fn rejects_unbalanced_parentheses() -> TestResult {
    let open = parse_query("(a=1 OR b=2").unwrap_err();
    ensure(
        open == QueryParseError::UnbalancedParenthesis {
            pos: 0,
        },
        format!("Unexpected diagnostic: {open:?}"),
    )?;

    let close = parse_query("a=1 OR b=2)").unwrap_err();
    ensure(
        close == QueryParseError::UnbalancedParenthesis {
            pos: 10,
        },
        format!("Unexpected diagnostic: {close:?}"),
    )
}

#[test]
fn rejects_missing_operands() -> TestResult {
    let trailing = parse_query("a=1 AND").unwrap_err();
    ensure(
        trailing
            == QueryParseError::MissingOperand {
                pos: 7,
                operator: "AND",
            },
        format!("Unexpected diagnostic: {trailing:?}"),
    )?;

    let lonely = parse_query("NOT").unwrap_err();
    ensure(
        lonely
            == QueryParseError::MissingOperand {
                pos: 3,
                operator: "NOT",
            },
        format!("Unexpected diagnostic: {lonely:?}"),
    )?;

    let leading = parse_query("OR a=1").unwrap_err();
    ensure(
        leading
            == QueryParseError::MissingOperand {
                pos: 0,
                operator: "OR",
            },
        format!("Unexpected diagnostic: {leading:?}"),
    )
}

#[test]
fn rejects_malformed_match_terms() -> TestResult {
    let missing_equals = parse_query("environment").unwrap_err();
    ensure(
        matches!(missing_equals, QueryParseError::MissingEquals { .. }),
        format!("Unexpected diagnostic: {missing_equals:?}"),
    )?;

    let missing_key = parse_query("=production").unwrap_err();
    ensure(
        missing_key
            == QueryParseError::MissingKey {
                pos: 0,
            },
        format!("Unexpected diagnostic: {missing_key:?}"),
    )?;

    let missing_value = parse_query("environment=").unwrap_err();
    ensure(
        missing_value
            == QueryParseError::MissingValue {
                pos: 12,
                key: "environment".to_string(),
            },
        format!("Unexpected diagnostic: {missing_value:?}"),
    )
}

#[test]
fn rejects_trailing_input() -> TestResult {
    let err = parse_query("a=1 b=2").unwrap_err();
    ensure(
        err == QueryParseError::TrailingInput {
            pos: 4,
            lexeme: "b".to_string(),
        },
        format!("Unexpected diagnostic: {err:?}"),
    )
}

#[test]
fn rejects_excessive_nesting() -> TestResult {
    let mut query = String::new();
    for _ in 0..80 {
        query.push('(');
    }
    query.push_str("a=1");
    for _ in 0..80 {
        query.push(')');
    }
    let err = parse_query(&query).unwrap_err();
    ensure(
        matches!(err, QueryParseError::TooDeep { .. }),
        format!("Unexpected diagnostic: {err:?}"),
    )
}

#[test]
fn errors_expose_positions() -> TestResult {
    let err = parse_query("a=1 AND").unwrap_err();
    ensure(err.position() == Some(7), "Expected position for MissingOperand")?;
    ensure(QueryParseError::Empty.position().is_none(), "Empty carries no position")
}
