//! Core library for checktree, a tree of checklist nodes with inherited
//! status and tags.
//!
//! The primary entry point is [`Workspace`], which represents an open
//! checktree SQLite database. All tree mutations go through `Workspace`
//! methods; each one runs in a single transaction and appends an
//! [`Operation`] to the durable log.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    copy::{CopyReport, CopyRequest, MergedPair, SkipReason, SkippedNode},
    delete::DeleteResult,
    error::{ChecktreeError, Result},
    node::{NewNode, Node, NodePatch, NodeType, Status},
    operation::Operation,
    operation_log::{OperationLog, OperationSummary, PurgeStrategy},
    ordering::Placement,
    storage::Storage,
    tag::{EffectiveView, TagAction, TagOp, TagOpKind, TagOpRequest},
    workspace::{Workspace, SEED_ROOT_TITLE},
};
