//! Row-level primitives over the `node` and `node_tag` tables.
//!
//! Every function takes a plain `&Connection` so it can run either on the
//! workspace connection or inside an open [`rusqlite::Transaction`] (which
//! derefs to `Connection`). None of them open transactions of their own.

use crate::{ChecktreeError, NewNode, Node, Result, TagOp};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;

/// Column list matching [`map_node_row`].
pub(crate) const NODE_COLUMNS: &str = "id, parent_id, type, title, description, note, sort, \
     explicit_status, version, created_at, updated_at";

/// Row-mapping closure for `rusqlite::Row` → [`Node`], in [`NODE_COLUMNS`] order.
pub(crate) fn map_node_row(row: &Row) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        node_type: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        note: row.get(5)?,
        sort: row.get(6)?,
        explicit_status: row.get(7)?,
        version: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Fetches a node, returning `None` when the id does not exist.
pub fn find_node(conn: &Connection, id: i64) -> Result<Option<Node>> {
    let node = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM node WHERE id = ?1"),
            [id],
            map_node_row,
        )
        .optional()?;
    Ok(node)
}

/// Fetches a node, surfacing a missing id as [`ChecktreeError::NodeNotFound`].
pub fn get_node(conn: &Connection, id: i64) -> Result<Node> {
    find_node(conn, id)?.ok_or(ChecktreeError::NodeNotFound(id))
}

/// Direct children of `parent_id` (`None` = roots), ordered by `sort` then `id`.
pub fn children(conn: &Connection, parent_id: Option<i64>) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM node WHERE parent_id IS ?1 ORDER BY sort, id"
    ))?;
    let rows = stmt
        .query_map([parent_id], map_node_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// First child of `parent_id` whose title is exactly `title` (case-sensitive).
pub fn child_by_title(conn: &Connection, parent_id: Option<i64>, title: &str) -> Result<Option<Node>> {
    let node = conn
        .query_row(
            &format!(
                "SELECT {NODE_COLUMNS} FROM node WHERE parent_id IS ?1 AND title = ?2
                 ORDER BY sort, id LIMIT 1"
            ),
            params![parent_id, title],
            map_node_row,
        )
        .optional()?;
    Ok(node)
}

/// Returns `id` followed by each ancestor up to the root.
///
/// The walk stops at a null `parent_id`, at a parent that no longer exists,
/// or at a node already visited, so a corrupted chain can never loop.
///
/// # Errors
///
/// Returns [`ChecktreeError::NodeNotFound`] if `id` itself does not exist.
pub fn ancestor_chain(conn: &Connection, id: i64) -> Result<Vec<Node>> {
    let mut chain = vec![get_node(conn, id)?];
    let mut visited = HashSet::from([id]);
    while let Some(parent_id) = chain.last().and_then(|n| n.parent_id) {
        if !visited.insert(parent_id) {
            log::warn!("ancestor chain of node {id} loops back to node {parent_id}");
            break;
        }
        match find_node(conn, parent_id)? {
            Some(parent) => chain.push(parent),
            None => {
                log::warn!("ancestor chain of node {id} dangles at missing node {parent_id}");
                break;
            }
        }
    }
    Ok(chain)
}

/// Ids of `root` and all its descendants. `UNION` (not `UNION ALL`) keeps the
/// recursive query finite even if the parent links contain a cycle.
pub fn subtree_ids(conn: &Connection, root: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE sub(id) AS (
             SELECT id FROM node WHERE id = ?1
             UNION
             SELECT n.id FROM node n JOIN sub s ON n.parent_id = s.id
         )
         SELECT id FROM sub",
    )?;
    let ids = stmt
        .query_map([root], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// `root` and all descendants, root first, then ordered by `(parent_id, sort, id)`.
pub fn subtree(conn: &Connection, root: i64) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare(&format!(
        "WITH RECURSIVE sub(id) AS (
             SELECT id FROM node WHERE id = ?1
             UNION
             SELECT n.id FROM node n JOIN sub s ON n.parent_id = s.id
         )
         SELECT {NODE_COLUMNS} FROM node WHERE id IN (SELECT id FROM sub)
         ORDER BY (id = ?1) DESC, parent_id, sort, id"
    ))?;
    let rows = stmt
        .query_map([root], map_node_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Local tag-ops owned by `node_id`, ordered by tag then op.
pub fn tag_ops(conn: &Connection, node_id: i64) -> Result<Vec<TagOp>> {
    let mut stmt =
        conn.prepare("SELECT tag, op FROM node_tag WHERE node_id = ?1 ORDER BY tag, op")?;
    let ops = stmt
        .query_map([node_id], |row| Ok(TagOp { tag: row.get(0)?, op: row.get(1)? }))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ops)
}

/// Every tag-op owned by any of `node_ids`.
pub fn chain_tag_ops(conn: &Connection, node_ids: &[i64]) -> Result<Vec<TagOp>> {
    if node_ids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = node_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT tag, op FROM node_tag WHERE node_id IN ({placeholders})"
    ))?;
    let ops = stmt
        .query_map(params_from_iter(node_ids), |row| {
            Ok(TagOp { tag: row.get(0)?, op: row.get(1)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ops)
}

/// Inserts a node at version 1 and returns its id.
///
/// Callers validate `new` and resolve the sort key beforehand.
pub fn insert_node(conn: &Connection, new: &NewNode, sort: f64, now: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO node (parent_id, type, title, description, note, sort, explicit_status,
                           version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
        params![
            new.parent_id,
            new.node_type,
            new.title,
            new.description,
            new.note,
            sort,
            new.explicit_status,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Inserts one tag-op row; an identical existing row is left as is.
pub fn insert_tag_op(conn: &Connection, node_id: i64, op: &TagOp) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO node_tag (node_id, tag, op) VALUES (?1, ?2, ?3)",
        params![node_id, op.tag, op.op],
    )?;
    Ok(())
}

/// Deletes one tag-op row, returning whether it existed.
pub fn delete_tag_op(conn: &Connection, node_id: i64, op: &TagOp) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM node_tag WHERE node_id = ?1 AND tag = ?2 AND op = ?3",
        params![node_id, op.tag, op.op],
    )?;
    Ok(n > 0)
}

/// Increments `version` by one and stamps `updated_at`.
///
/// Every mutating request calls this exactly once per node it changes.
pub fn bump_version(conn: &Connection, id: i64, now: i64) -> Result<()> {
    let n = conn.execute(
        "UPDATE node SET version = version + 1, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    if n == 0 {
        return Err(ChecktreeError::NodeNotFound(id));
    }
    Ok(())
}

/// Number of childless `WHEN` nodes in the subtree rooted at `id` (inclusive).
pub fn leaf_when_count(conn: &Connection, id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "WITH RECURSIVE sub(id) AS (
             SELECT id FROM node WHERE id = ?1
             UNION
             SELECT n.id FROM node n JOIN sub s ON n.parent_id = s.id
         )
         SELECT COUNT(*) FROM node x
         WHERE x.id IN (SELECT id FROM sub)
           AND x.type = 'WHEN'
           AND NOT EXISTS (SELECT 1 FROM node c WHERE c.parent_id = x.id)",
        [id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
