//! Resolution of inherited status and tags along an ancestor chain.
//!
//! The two attributes inherit differently:
//!
//! - **Status** is "nearest wins": the first explicit status found walking
//!   from the node towards the root, or [`Status::DEFAULT`].
//! - **Tags** are a set operation over the whole chain: every `add` anywhere
//!   on the chain minus every `remove` anywhere on the chain. A `remove` on an
//!   ancestor therefore suppresses the tag even if a closer node re-adds it.
//!
//! Both functions are pure; callers gather the chain with
//! [`tree::ancestor_chain`](super::tree::ancestor_chain) and the tag-ops with
//! [`tree::chain_tag_ops`](super::tree::chain_tag_ops).

use crate::{EffectiveView, Node, Status, TagOp, TagOpKind};
use std::collections::BTreeSet;

/// Returns the nearest explicit status in `chain`, which must start at the
/// node itself and end at the root.
pub fn effective_status<I>(chain: I) -> Status
where
    I: IntoIterator<Item = Option<Status>>,
{
    chain.into_iter().flatten().next().unwrap_or(Status::DEFAULT)
}

/// Returns `adds \ removes` over every tag-op owned by any node on the chain,
/// sorted and deduplicated.
pub fn effective_tags<'a, I>(ops: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TagOp>,
{
    let mut adds = BTreeSet::new();
    let mut removes = BTreeSet::new();
    for op in ops {
        match op.op {
            TagOpKind::Add => adds.insert(op.tag.as_str()),
            TagOpKind::Remove => removes.insert(op.tag.as_str()),
        };
    }
    adds.difference(&removes).map(|t| (*t).to_string()).collect()
}

/// Combines both resolutions into an [`EffectiveView`].
pub fn resolve(chain: &[Node], ops: &[TagOp]) -> EffectiveView {
    EffectiveView {
        status: effective_status(chain.iter().map(|n| n.explicit_status)),
        tags: effective_tags(ops),
    }
}
