// signalbeam-core/src/core/group.rs
// ============================================================================
// Module: SignalBeam Device Groups
// Description: Static and dynamic device group records.
// Purpose: Define group records whose membership feeds rollout target
// selection.
// Dependencies: crate::core::{identifiers, time}, serde, tag-logic, thiserror
// ============================================================================

//! ## Overview
//! Static groups store explicit membership rows. Dynamic groups store a tag
//! query and derive membership by evaluating it against the tenant's
//! devices; a device belongs to a dynamic group exactly when its tag set
//! satisfies the query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tag_logic::QueryParseError;
use tag_logic::parse_query;
use thiserror::Error;

use crate::core::identifiers::DeviceId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Group Types
// ============================================================================

/// Kind of device group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Membership stored as explicit rows.
    Static,
    /// Membership derived by evaluating `tag_query`.
    Dynamic,
}

// ============================================================================
// SECTION: Group Errors
// ============================================================================

/// Errors produced while validating a device group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// A dynamic group was missing its tag query.
    #[error("dynamic group has no tag query")]
    MissingQuery,
    /// A static group carried a tag query.
    #[error("static group must not carry a tag query")]
    UnexpectedQuery,
    /// The tag query failed to parse.
    #[error("invalid tag query: {0}")]
    InvalidQuery(#[from] QueryParseError),
}

// ============================================================================
// SECTION: Group Records
// ============================================================================

/// A device group owned by a tenant.
///
/// # Invariants
/// - `tag_query` is present exactly when `group_type` is [`GroupType::Dynamic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Group identifier.
    pub group_id: GroupId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Group kind.
    pub group_type: GroupType,
    /// Tag query for dynamic groups.
    pub tag_query: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

impl DeviceGroup {
    /// Validates the group's type/query pairing and query syntax.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError`] when the pairing is wrong or the query fails
    /// to parse.
    pub fn validate(&self) -> Result<(), GroupError> {
        match (self.group_type, self.tag_query.as_deref()) {
            (GroupType::Dynamic, Some(query)) => {
                parse_query(query)?;
                Ok(())
            }
            (GroupType::Dynamic, None) => Err(GroupError::MissingQuery),
            (GroupType::Static, Some(_)) => Err(GroupError::UnexpectedQuery),
            (GroupType::Static, None) => Ok(()),
        }
    }
}

/// Explicit membership row for a static group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    /// Group identifier.
    pub group_id: GroupId,
    /// Member device.
    pub device_id: DeviceId,
    /// When the device was added.
    pub added_at: Timestamp,
    /// Operator who added the device.
    pub added_by: String,
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

    use super::DeviceGroup;
    use super::GroupError;
    use super::GroupType;
    use crate::core::identifiers::GroupId;
    use crate::core::identifiers::TenantId;
    use crate::core::time::Timestamp;

    /// Builds a group of the given kind with an optional query.
    fn group(group_type: GroupType, tag_query: Option<&str>) -> DeviceGroup {
        DeviceGroup {
            group_id: GroupId::random(),
            tenant_id: TenantId::random(),
            name: "warehouse".to_string(),
            group_type,
            tag_query: tag_query.map(ToString::to_string),
            created_at: Timestamp::from_unix_millis(0).expect("timestamp"),
        }
    }

    #[test]
    fn validates_type_query_pairing() {
        assert_eq!(group(GroupType::Static, None).validate(), Ok(()));
        assert_eq!(
            group(GroupType::Static, Some("a=1")).validate(),
            Err(GroupError::UnexpectedQuery)
        );
        assert_eq!(group(GroupType::Dynamic, None).validate(), Err(GroupError::MissingQuery));
        assert_eq!(group(GroupType::Dynamic, Some("location=warehouse-*")).validate(), Ok(()));
    }

    #[test]
    fn surfaces_query_parse_failures() {
        let err = group(GroupType::Dynamic, Some("location=")).validate().unwrap_err();
        assert!(matches!(err, GroupError::InvalidQuery(_)));
    }
}
