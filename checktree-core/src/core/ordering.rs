//! Sort-key allocation among siblings.
//!
//! Keys are `f64`s compared with `id` as tie-breaker. Appending takes
//! `max + 1`; inserting after a sibling takes `sibling + 0.5`, so repeated
//! insertions never need to touch existing rows. Repeated halving at the
//! same spot eventually runs out of precision; [`renumber_children`] resets a
//! sibling group to `0, 1, 2, …` without changing its order.

use crate::core::tree;
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Offset added to a reference sibling's key when inserting right after it.
pub const INSERT_AFTER_OFFSET: f64 = 0.5;

/// Where a new node goes among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After the last existing child.
    Append,
    /// Directly after the given sibling.
    After(i64),
}

impl From<Option<i64>> for Placement {
    fn from(after: Option<i64>) -> Self {
        after.map_or(Self::Append, Self::After)
    }
}

/// `max(sort) + 1` over the children of `parent_id`, or `0` when there are none.
pub fn append_sort(conn: &Connection, parent_id: Option<i64>) -> Result<f64> {
    let max: Option<f64> = conn.query_row(
        "SELECT MAX(sort) FROM node WHERE parent_id IS ?1",
        [parent_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0.0, |m| m + 1.0))
}

/// `sort(sibling) + 0.5`, or `None` if the sibling no longer exists.
pub fn sort_after(conn: &Connection, sibling_id: i64) -> Result<Option<f64>> {
    let sort: Option<f64> = conn
        .query_row("SELECT sort FROM node WHERE id = ?1", [sibling_id], |row| row.get(0))
        .optional()?;
    Ok(sort.map(|s| s + INSERT_AFTER_OFFSET))
}

/// Resolves `placement` under `parent_id` to a concrete key.
///
/// A vanished reference sibling degrades to appending.
pub fn allocate(conn: &Connection, parent_id: Option<i64>, placement: Placement) -> Result<f64> {
    if let Placement::After(sibling_id) = placement {
        if let Some(sort) = sort_after(conn, sibling_id)? {
            log::debug!("placing after node {sibling_id} at sort {sort}");
            return Ok(sort);
        }
        log::debug!("reference sibling {sibling_id} is gone; appending instead");
    }
    append_sort(conn, parent_id)
}

/// Rewrites the keys of `parent_id`'s children to consecutive integers in
/// their current order, bumping the version of each node whose key changed.
///
/// Returns the ids that were rewritten.
pub fn renumber_children(conn: &Connection, parent_id: Option<i64>, now: i64) -> Result<Vec<i64>> {
    let mut changed = Vec::new();
    for (index, child) in tree::children(conn, parent_id)?.iter().enumerate() {
        let target = index as f64;
        if child.sort == target {
            continue;
        }
        conn.execute("UPDATE node SET sort = ?1 WHERE id = ?2", params![target, child.id])?;
        tree::bump_version(conn, child.id, now)?;
        changed.push(child.id);
    }
    Ok(changed)
}
