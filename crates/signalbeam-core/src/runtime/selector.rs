// signalbeam-core/src/runtime/selector.rs
// ============================================================================
// Module: SignalBeam Target Selection
// Description: Expansion of target selectors into device lists.
// Purpose: Resolve groups, tag queries, and literal lists into one
// deterministic, lexicographically ordered device set.
// Dependencies: crate::{core, interfaces}, tag-logic, serde, thiserror
// ============================================================================

//! ## Overview
//! Every selector path returns the same shape: device identifiers sorted in
//! lexicographic order with duplicates removed. That ordering is what makes
//! planner materialization deterministic and testable. Dynamic-group and
//! tag-query expansion evaluates the parsed expression against each
//! device's normalized tag set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tag_logic::QueryParseError;
use tag_logic::TagExpr;
use tag_logic::parse_query;
use thiserror::Error;

use crate::core::Classify;
use crate::core::DeviceId;
use crate::core::ErrorClass;
use crate::core::GroupId;
use crate::core::TenantId;
use crate::core::group::GroupType;
use crate::interfaces::DeviceDirectory;
use crate::interfaces::DirectoryError;

// ============================================================================
// SECTION: Target Selector
// ============================================================================

/// How a rollout's target device set is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSelector {
    /// Every device of the tenant.
    AllDevices,
    /// Members of a static or dynamic group.
    Group {
        /// Group identifier.
        group_id: GroupId,
    },
    /// Devices whose tag set satisfies the query.
    TagQuery {
        /// Query text.
        query: String,
    },
    /// An explicit device list (validated against the tenant).
    DeviceIds {
        /// Device identifiers.
        device_ids: Vec<DeviceId>,
    },
}

// ============================================================================
// SECTION: Selector Errors
// ============================================================================

/// Errors produced while expanding a target selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The tag query failed to parse.
    #[error("invalid tag query: {0}")]
    InvalidQuery(#[from] QueryParseError),
    /// A dynamic group carried no tag query.
    #[error("dynamic group {0} has no tag query")]
    DynamicGroupWithoutQuery(GroupId),
    /// The device directory reported an error.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl Classify for SelectorError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidQuery(_) => ErrorClass::Validation,
            Self::DynamicGroupWithoutQuery(_) => ErrorClass::Fatal,
            Self::Directory(err) => err.class(),
        }
    }
}

// ============================================================================
// SECTION: Expansion
// ============================================================================

/// Expands a selector into an ordered, deduplicated device list.
///
/// # Errors
///
/// Returns [`SelectorError`] when a query fails to parse, a group is
/// missing or malformed, or the directory rejects the request.
pub fn expand_selector<D: DeviceDirectory>(
    directory: &D,
    tenant_id: TenantId,
    selector: &TargetSelector,
) -> Result<Vec<DeviceId>, SelectorError> {
    let devices = match selector {
        TargetSelector::AllDevices => directory
            .list_devices(tenant_id)?
            .into_iter()
            .map(|device| device.device_id)
            .collect(),
        TargetSelector::Group {
            group_id,
        } => {
            let group = directory.group(tenant_id, *group_id)?;
            match group.group_type {
                GroupType::Static => directory.static_members(tenant_id, *group_id)?,
                GroupType::Dynamic => {
                    let query = group
                        .tag_query
                        .as_deref()
                        .ok_or(SelectorError::DynamicGroupWithoutQuery(*group_id))?;
                    let expr = parse_query(query)?;
                    evaluate_over_tenant(directory, tenant_id, &expr)?
                }
            }
        }
        TargetSelector::TagQuery {
            query,
        } => {
            let expr = parse_query(query)?;
            evaluate_over_tenant(directory, tenant_id, &expr)?
        }
        TargetSelector::DeviceIds {
            device_ids,
        } => {
            directory.validate_devices(tenant_id, device_ids)?;
            device_ids.clone()
        }
    };

    Ok(ordered(devices))
}

/// Evaluates a parsed query against every device of the tenant.
fn evaluate_over_tenant<D: DeviceDirectory>(
    directory: &D,
    tenant_id: TenantId,
    expr: &TagExpr,
) -> Result<Vec<DeviceId>, SelectorError> {
    Ok(directory
        .list_devices(tenant_id)?
        .into_iter()
        .filter(|device| expr.evaluate(&device.tags))
        .map(|device| device.device_id)
        .collect())
}

/// Sorts lexicographically and removes duplicates.
fn ordered(mut devices: Vec<DeviceId>) -> Vec<DeviceId> {
    devices.sort();
    devices.dedup();
    devices
}
