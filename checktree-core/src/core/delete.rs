//! Result type for subtree removal.
//!
//! Deleting a node always removes its whole subtree; the `node` and
//! `node_tag` foreign keys cascade, so a single `DELETE` takes descendants
//! and their tag-ops with it.
//!
//! ## Serialization
//!
//! `DeleteResult` fields serialize in camelCase (`deletedCount`,
//! `affectedIds`), consistent with the other return types in this project.
//!
//! ```rust
//! use checktree_core::DeleteResult;
//!
//! let result = DeleteResult {
//!     deleted_count: 3,
//!     affected_ids: vec![4, 5, 6],
//! };
//! let json = serde_json::to_string(&result).unwrap();
//! assert!(json.contains("deletedCount"));
//! assert!(json.contains("affectedIds"));
//! ```

use serde::{Deserialize, Serialize};

/// The outcome of [`Workspace::delete_node`](super::workspace::Workspace::delete_node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// The total number of nodes that were permanently removed.
    pub deleted_count: usize,

    /// Ids of every removed node, the deleted root first.
    pub affected_ids: Vec<i64>,
}
