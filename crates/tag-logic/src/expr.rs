// tag-logic/src/expr.rs
// ============================================================================
// Module: Tag Query Expression Tree
// Description: Boolean algebra over tag match terms.
// Purpose: Define the `TagExpr` AST, short-circuit evaluation, and the
// canonical printer whose output reparses to the identical tree.
// Dependencies: crate::tag, serde, smallvec
// ============================================================================

//! ## Overview
//! A parsed query is a tree of `And`/`Or`/`Not` nodes over `Match` leaves.
//! The logical operators are universal; `Match` is the boundary where tag
//! semantics are injected. Evaluation short-circuits and never errors:
//! malformed stored tags were already skipped at tag-set construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use crate::tag::TagSet;

// ============================================================================
// SECTION: Match Pattern
// ============================================================================

/// The right-hand side of a `key=pattern` query term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchPattern {
    /// Exact value comparison.
    Literal(String),
    /// `*`-wildcard comparison (consecutive wildcards already collapsed).
    Wildcard(String),
}

impl MatchPattern {
    /// Classifies a raw pattern, collapsing consecutive wildcards.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if raw.contains('*') {
            Self::Wildcard(collapse_wildcards(raw))
        } else {
            Self::Literal(raw.to_string())
        }
    }

    /// Returns the pattern text used for matching.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Wildcard(text) => text,
        }
    }
}

/// Collapses runs of `*` into a single wildcard character.
fn collapse_wildcards(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut last_star = false;
    for ch in raw.chars() {
        if ch == '*' {
            if !last_star {
                collapsed.push('*');
            }
            last_star = true;
        } else {
            collapsed.push(ch);
            last_star = false;
        }
    }
    collapsed
}

// ============================================================================
// SECTION: Expression Tree
// ============================================================================

/// Boolean tag query expression.
///
/// # Invariants
/// - `And`/`Or` children are never flattened across explicit parentheses;
///   the tree shape is exactly what the parser produced.
/// - `Match` keys and pattern texts are lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagExpr {
    /// Logical AND: all children must be satisfied. Short-circuits on the
    /// first failure.
    And(SmallVec<[Box<Self>; 4]>),
    /// Logical OR: at least one child must be satisfied. Short-circuits on
    /// the first success.
    Or(SmallVec<[Box<Self>; 4]>),
    /// Logical NOT: inverts the child result.
    Not(Box<Self>),
    /// Atomic `key=pattern` term evaluated against the tag set.
    Match {
        /// Query key compared against structured tag keys.
        key: String,
        /// Literal or wildcard value pattern.
        pattern: MatchPattern,
    },
}

impl TagExpr {
    /// Creates a logical AND of the given expressions.
    #[must_use]
    pub fn and(children: Vec<Self>) -> Self {
        Self::And(children.into_iter().map(Box::new).collect())
    }

    /// Creates a logical OR of the given expressions.
    #[must_use]
    pub fn or(children: Vec<Self>) -> Self {
        Self::Or(children.into_iter().map(Box::new).collect())
    }

    /// Creates a logical NOT of the given expression.
    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    /// Creates a match term, classifying the pattern as literal or wildcard.
    #[must_use]
    pub fn matches(key: impl Into<String>, pattern: &str) -> Self {
        Self::Match {
            key: key.into(),
            pattern: MatchPattern::classify(pattern),
        }
    }

    /// Evaluates this expression against a device tag set.
    ///
    /// Implements the obvious short-circuit recursion: AND exits on the
    /// first false child, OR on the first true child.
    #[must_use]
    pub fn evaluate(&self, tags: &TagSet) -> bool {
        match self {
            Self::Match {
                key,
                pattern,
            } => tags.any_match(key, pattern.as_str()),
            Self::Not(child) => !child.evaluate(tags),
            Self::And(children) => {
                for child in children {
                    if !child.evaluate(tags) {
                        return false;
                    }
                }
                true
            }
            Self::Or(children) => {
                for child in children {
                    if child.evaluate(tags) {
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Returns the node count of this expression tree.
    #[must_use]
    pub fn complexity(&self) -> usize {
        match self {
            Self::Match {
                ..
            } => 1,
            Self::Not(child) => 1 + child.complexity(),
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(|child| child.complexity()).sum::<usize>()
            }
        }
    }

    /// Writes the canonical query form of one child, parenthesizing
    /// composite children so the printed text reparses to this exact tree.
    fn fmt_child(child: &Self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match child {
            Self::Match {
                ..
            } => write!(f, "{child}"),
            _ => write!(f, "({child})"),
        }
    }
}

impl fmt::Display for TagExpr {
    /// Formats the canonical query string for this expression.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match {
                key,
                pattern,
            } => write!(f, "{key}={}", pattern.as_str()),
            Self::Not(child) => {
                write!(f, "NOT ")?;
                Self::fmt_child(child, f)
            }
            Self::And(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        write!(f, " AND ")?;
                    }
                    Self::fmt_child(child, f)?;
                }
                Ok(())
            }
            Self::Or(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        write!(f, " OR ")?;
                    }
                    Self::fmt_child(child, f)?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================
