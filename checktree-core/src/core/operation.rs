//! Audit records for committed tree mutations.

use crate::{NodePatch, NodeType, TagAction, TagOp, TagOpKind};
use serde::{Deserialize, Serialize};

/// A single tree mutation recorded in the operation log.
///
/// Every variant carries a stable `operation_id` (UUID v4) and the Unix
/// `timestamp` at which the mutation was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// A node was inserted.
    CreateNode {
        operation_id: String,
        timestamp: i64,
        node_id: i64,
        parent_id: Option<i64>,
        node_type: NodeType,
        title: String,
        sort: f64,
    },
    /// A node's own fields were patched.
    UpdateNode {
        operation_id: String,
        timestamp: i64,
        node_id: i64,
        /// The patch as applied (expected version included when supplied).
        patch: NodePatch,
        /// Version after the bump.
        version: i64,
    },
    /// A node and its whole subtree were deleted.
    DeleteNode {
        operation_id: String,
        timestamp: i64,
        node_id: i64,
        deleted_count: usize,
    },
    /// All local tag-ops of a node were replaced.
    ReplaceTags {
        operation_id: String,
        timestamp: i64,
        node_id: i64,
        ops: Vec<TagOp>,
    },
    /// One local tag-op was inserted or deleted.
    UpdateTag {
        operation_id: String,
        timestamp: i64,
        node_id: i64,
        tag: String,
        op: TagOpKind,
        action: TagAction,
    },
    /// A subtree was copied or merged into a destination.
    CopySubtree {
        operation_id: String,
        timestamp: i64,
        source_id: i64,
        target_parent_id: Option<i64>,
        new_root_id: Option<i64>,
        created: usize,
        merged: usize,
        skipped: usize,
    },
    /// A sibling group's sort keys were rewritten.
    RenumberChildren {
        operation_id: String,
        timestamp: i64,
        parent_id: Option<i64>,
        renumbered: Vec<i64>,
    },
}

impl Operation {
    /// Returns the stable identifier for this operation.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        match self {
            Self::CreateNode { operation_id, .. }
            | Self::UpdateNode { operation_id, .. }
            | Self::DeleteNode { operation_id, .. }
            | Self::ReplaceTags { operation_id, .. }
            | Self::UpdateTag { operation_id, .. }
            | Self::CopySubtree { operation_id, .. }
            | Self::RenumberChildren { operation_id, .. } => operation_id,
        }
    }

    /// Returns the Unix timestamp (seconds) at which this operation was committed.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::CreateNode { timestamp, .. }
            | Self::UpdateNode { timestamp, .. }
            | Self::DeleteNode { timestamp, .. }
            | Self::ReplaceTags { timestamp, .. }
            | Self::UpdateTag { timestamp, .. }
            | Self::CopySubtree { timestamp, .. }
            | Self::RenumberChildren { timestamp, .. } => *timestamp,
        }
    }

    /// Variant name as stored in the `operation_type` column.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "CreateNode",
            Self::UpdateNode { .. } => "UpdateNode",
            Self::DeleteNode { .. } => "DeleteNode",
            Self::ReplaceTags { .. } => "ReplaceTags",
            Self::UpdateTag { .. } => "UpdateTag",
            Self::CopySubtree { .. } => "CopySubtree",
            Self::RenumberChildren { .. } => "RenumberChildren",
        }
    }
}
