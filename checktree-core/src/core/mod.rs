//! Internal domain modules for the checktree core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod copy;
pub mod delete;
pub mod error;
pub mod node;
pub mod operation;
pub mod operation_log;
pub mod ordering;
pub mod overlay;
pub mod storage;
pub mod tag;
pub mod tree;
pub mod workspace;

#[doc(inline)]
pub use copy::{CopyReport, CopyRequest, MergedPair, SkipReason, SkippedNode};
#[doc(inline)]
pub use delete::DeleteResult;
#[doc(inline)]
pub use error::{ChecktreeError, Result};
#[doc(inline)]
pub use node::{NewNode, Node, NodePatch, NodeType, Status};
#[doc(inline)]
pub use operation::Operation;
#[doc(inline)]
pub use operation_log::{OperationLog, OperationSummary, PurgeStrategy};
#[doc(inline)]
pub use ordering::Placement;
#[doc(inline)]
pub use storage::Storage;
#[doc(inline)]
pub use tag::{EffectiveView, TagAction, TagOp, TagOpKind, TagOpRequest};
#[doc(inline)]
pub use workspace::{Workspace, SEED_ROOT_TITLE};
