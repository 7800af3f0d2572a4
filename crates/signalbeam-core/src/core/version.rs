// signalbeam-core/src/core/version.rs
// ============================================================================
// Module: SignalBeam Version Strings
// Description: Semantic version and checksum string validation.
// Purpose: Validate bundle version tags and manifest checksums at the
// boundary; downstream code treats them as opaque.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Bundle versions are semantic version strings matching
//! `MAJOR.MINOR.PATCH` with an optional pre-release suffix. Checksums are
//! `sha256:` followed by 64 lowercase hex digits. Both are validated
//! character by character at construction and never re-checked afterwards.
//! The core does not order versions; `previousVersion` is an explicit
//! field, not a computed predecessor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Version Errors
// ============================================================================

/// Errors produced while validating a semantic version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The version string was empty.
    #[error("version is empty")]
    Empty,
    /// The version did not have three dot-separated numeric components.
    #[error("version {0:?} is not MAJOR.MINOR.PATCH")]
    MalformedCore(String),
    /// The pre-release suffix contained an invalid character.
    #[error("version {0:?} has an invalid pre-release suffix")]
    MalformedPreRelease(String),
}

// ============================================================================
// SECTION: Semantic Version
// ============================================================================

/// A validated semantic version string for a bundle version.
///
/// # Invariants
/// - Matches `^\d+\.\d+\.\d+(-[a-zA-Z0-9.-]+)?$`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemverVersion(String);

impl SemverVersion {
    /// Validates and wraps a semantic version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when the string does not match the expected
    /// shape.
    pub fn parse(raw: impl Into<String>) -> Result<Self, VersionError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let (core, pre_release) = match raw.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (raw.as_str(), None),
        };

        let mut components = core.split('.');
        let valid_core = components.clone().count() == 3
            && components.all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        if !valid_core {
            return Err(VersionError::MalformedCore(raw));
        }

        if let Some(pre) = pre_release {
            let valid_pre = !pre.is_empty()
                && pre.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
            if !valid_pre {
                return Err(VersionError::MalformedPreRelease(raw));
            }
        }

        Ok(Self(raw))
    }

    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SemverVersion {
    type Err = VersionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

// ============================================================================
// SECTION: Checksum Errors
// ============================================================================

/// Errors produced while validating a checksum string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumError {
    /// The checksum did not start with the `sha256:` prefix.
    #[error("checksum {0:?} is missing the sha256: prefix")]
    MissingPrefix(String),
    /// The digest was not 64 lowercase hex characters.
    #[error("checksum {0:?} digest is not 64 lowercase hex characters")]
    MalformedDigest(String),
}

// ============================================================================
// SECTION: Checksum
// ============================================================================

/// A validated `sha256:<64 hex>` checksum for a bundle manifest.
///
/// The core never computes digests; blob storage produces them and the edge
/// agent verifies them. This type only enforces the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Validates and wraps a checksum string.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError`] when the prefix or digest is malformed.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ChecksumError> {
        let raw = raw.into();
        let Some(digest) = raw.strip_prefix("sha256:") else {
            return Err(ChecksumError::MissingPrefix(raw));
        };
        let valid = digest.len() == 64
            && digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(ChecksumError::MalformedDigest(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the checksum as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Unit Tests
// ============================================================================
