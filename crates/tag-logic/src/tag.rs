// tag-logic/src/tag.rs
// ============================================================================
// Module: Tag Model
// Description: Normalized device tags and wildcard value matching.
// Purpose: Classify raw tag strings and provide the matching primitive used
// by query evaluation.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A raw tag string is normalized (trimmed, lower-cased) and classified as
//! either structured (`"key=value"`) or simple (`"value"`). Simple tags
//! carry their value in both the key and value slots so that a query such
//! as `environment=production` still hits legacy devices tagged just
//! `production`. Stored tag components are restricted to `[a-z0-9_-]`;
//! wildcards appear only in query patterns, never in stored tags.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length accepted for a raw tag string after trimming.
pub const MAX_TAG_LENGTH: usize = 256;

// ============================================================================
// SECTION: Tag Errors
// ============================================================================

/// Errors produced while normalizing a raw tag string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// The raw tag was empty after trimming.
    #[error("tag is empty")]
    Empty,
    /// The raw tag exceeded [`MAX_TAG_LENGTH`].
    #[error("tag exceeds {MAX_TAG_LENGTH} characters")]
    TooLong,
    /// A structured tag was missing its key component.
    #[error("structured tag is missing a key")]
    MissingKey,
    /// A structured tag was missing its value component.
    #[error("structured tag is missing a value")]
    MissingValue,
    /// A tag component contained a character outside `[a-z0-9_-]`.
    #[error("invalid character {character:?} in tag component {component:?}")]
    InvalidCharacter {
        /// Offending character after normalization.
        character: char,
        /// Component that contained the character.
        component: String,
    },
}

// ============================================================================
// SECTION: Tag
// ============================================================================

/// A normalized device tag.
///
/// # Invariants
/// - `key` and `value` contain only `[a-z0-9_-]` characters.
/// - For a simple tag, `key == value`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key (equal to the value for simple tags).
    key: String,
    /// Tag value.
    value: String,
    /// True when the tag was stored without a `key=` prefix.
    simple: bool,
}

impl Tag {
    /// Normalizes and classifies a raw tag string.
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] when the tag is empty, oversized, or contains
    /// characters outside the stored-tag alphabet.
    pub fn parse(raw: &str) -> Result<Self, TagError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(TagError::Empty);
        }
        if normalized.len() > MAX_TAG_LENGTH {
            return Err(TagError::TooLong);
        }

        match normalized.split_once('=') {
            Some((key, value)) => {
                if key.is_empty() {
                    return Err(TagError::MissingKey);
                }
                if value.is_empty() {
                    return Err(TagError::MissingValue);
                }
                validate_component(key)?;
                validate_component(value)?;
                Ok(Self {
                    key: key.to_string(),
                    value: value.to_string(),
                    simple: false,
                })
            }
            None => {
                validate_component(&normalized)?;
                Ok(Self {
                    value: normalized.clone(),
                    key: normalized,
                    simple: true,
                })
            }
        }
    }

    /// Returns the tag key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the tag value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the tag was stored without a key.
    #[must_use]
    pub const fn is_simple(&self) -> bool {
        self.simple
    }

    /// Returns true when this tag satisfies a `key=pattern` query term.
    ///
    /// A structured tag matches when the query key equals the tag key and
    /// the pattern matches the tag value. A simple tag matches when the
    /// pattern matches the tag value; the query key is ignored.
    #[must_use]
    pub fn matches(&self, query_key: &str, pattern: &str) -> bool {
        if self.simple {
            wildcard_match(pattern, &self.value)
        } else {
            self.key == query_key && wildcard_match(pattern, &self.value)
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.simple {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

/// Validates a stored tag component against `^[a-z0-9_-]+$`.
fn validate_component(component: &str) -> Result<(), TagError> {
    match component.chars().find(|ch| !is_component_char(*ch)) {
        Some(character) => Err(TagError::InvalidCharacter {
            character,
            component: component.to_string(),
        }),
        None => Ok(()),
    }
}

/// Returns true for characters allowed in stored tag components.
const fn is_component_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
}

// ============================================================================
// SECTION: Tag Set
// ============================================================================

/// An ordered set of normalized tags belonging to one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    /// Normalized tags in insertion order.
    tags: Vec<Tag>,
}

impl TagSet {
    /// Creates an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tags: Vec::new(),
        }
    }

    /// Builds a tag set from raw strings, silently skipping invalid tags.
    ///
    /// Invalid stored tags are an ingestion defect, not an evaluation
    /// failure, so evaluation ignores them rather than erroring.
    #[must_use]
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in raw {
            if let Ok(tag) = Tag::parse(item.as_ref()) {
                set.insert(tag);
            }
        }
        set
    }

    /// Inserts a tag, ignoring exact duplicates.
    pub fn insert(&mut self, tag: Tag) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Returns true when the set contains no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the number of tags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Iterates over the tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// Returns true when any tag satisfies the `key=pattern` query term.
    #[must_use]
    pub fn any_match(&self, query_key: &str, pattern: &str) -> bool {
        self.tags.iter().any(|tag| tag.matches(query_key, pattern))
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

// ============================================================================
// SECTION: Wildcard Matching
// ============================================================================

/// Matches a `*`-wildcard pattern against a tag value.
///
/// `*` matches any (possibly empty) sequence of value characters, greedy
/// with backtracking. Consecutive wildcards collapse, so `**` is equivalent
/// to `*`. Matching is anchored at both ends.
#[must_use]
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut p = 0;
    let mut t = 0;
    let mut star: Option<usize> = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(star_p) = star {
            // Backtrack: let the last star consume one more character.
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
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

    use super::Tag;
    use super::TagError;
    use super::TagSet;
    use super::wildcard_match;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let tag = Tag::parse("  Environment=Production ").expect("tag");
        assert_eq!(tag.key(), "environment");
        assert_eq!(tag.value(), "production");
        assert!(!tag.is_simple());
    }

    #[test]
    fn parse_classifies_simple_tags() {
        let tag = Tag::parse("production").expect("tag");
        assert_eq!(tag.key(), "production");
        assert_eq!(tag.value(), "production");
        assert!(tag.is_simple());
    }

    #[test]
    fn parse_rejects_empty_and_partial_tags() {
        assert_eq!(Tag::parse("   "), Err(TagError::Empty));
        assert_eq!(Tag::parse("=value"), Err(TagError::MissingKey));
        assert_eq!(Tag::parse("key="), Err(TagError::MissingValue));
    }

    #[test]
    fn parse_rejects_wildcards_in_stored_tags() {
        let err = Tag::parse("location=warehouse-*").unwrap_err();
        assert!(matches!(err, TagError::InvalidCharacter { character: '*', .. }));
    }

    #[test]
    fn simple_tags_ignore_the_query_key() {
        let tag = Tag::parse("production").expect("tag");
        assert!(tag.matches("environment", "production"));
        assert!(tag.matches("anything", "prod*"));
        assert!(!tag.matches("environment", "staging"));
    }

    #[test]
    fn structured_tags_require_key_equality() {
        let tag = Tag::parse("environment=production").expect("tag");
        assert!(tag.matches("environment", "production"));
        assert!(!tag.matches("location", "production"));
    }

    #[test]
    fn from_raw_skips_invalid_tags() {
        let set = TagSet::from_raw(["ok", "bad tag!", "k=v", "=broken"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn wildcard_matches_are_greedy_and_anchored() {
        assert!(wildcard_match("warehouse-*", "warehouse-seattle"));
        assert!(wildcard_match("*-seattle", "warehouse-seattle"));
        assert!(wildcard_match("w*e", "warehouse"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("warehouse-*", "depot-seattle"));
        assert!(!wildcard_match("house", "warehouse"));
    }

    #[test]
    fn consecutive_wildcards_collapse() {
        assert!(wildcard_match("w**e", "warehouse"));
        assert!(wildcard_match("***", "anything"));
    }
}
