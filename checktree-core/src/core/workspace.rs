//! High-level workspace operations over a checktree SQLite database.

use crate::core::{copy, ordering, overlay, tree};
use crate::{
    ChecktreeError, CopyReport, CopyRequest, DeleteResult, EffectiveView, NewNode, Node,
    NodePatch, NodeType, Operation, OperationLog, OperationSummary, PurgeStrategy, Result, Status,
    Storage, TagAction, TagOp, TagOpRequest,
};
use rusqlite::{params, Connection};
use std::path::Path;
use uuid::Uuid;

/// Title of the root node seeded into every new database.
pub const SEED_ROOT_TITLE: &str = "Root GIVEN";

/// An open checktree database.
///
/// `Workspace` is the primary interface for all tree mutations. It combines a
/// [`Storage`] connection with an [`OperationLog`] that records every
/// committed change. Each mutating method runs in a single transaction:
/// validation, writes, the version bump and the log entry either all land or
/// none do.
pub struct Workspace {
    storage: Storage,
    operation_log: OperationLog,
}

impl Workspace {
    /// Creates a new database at `path`, initialises the schema and seeds one
    /// root `GIVEN` node titled [`SEED_ROOT_TITLE`] with status `to do`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ChecktreeError::InvalidWorkspace`] if `path` already
    /// holds a checktree database with nodes (use [`Workspace::open`]), or
    /// [`crate::ChecktreeError::Database`] for any SQLite failure.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut storage = Storage::create(&path)?;
        let now = chrono::Utc::now().timestamp();

        let tx = storage.connection_mut().transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM node", [], |row| row.get(0))?;
        if existing > 0 {
            return Err(ChecktreeError::InvalidWorkspace(format!(
                "{} already holds a checktree database",
                path.as_ref().display()
            )));
        }
        let seed = NewNode {
            explicit_status: Some(Status::ToDo),
            ..NewNode::new(None, NodeType::Given, SEED_ROOT_TITLE)
        };
        let root_id = tree::insert_node(&tx, &seed, 0.0, now)?;
        tx.commit()?;
        log::info!("created workspace at {} (root node {root_id})", path.as_ref().display());

        Ok(Self {
            storage,
            operation_log: OperationLog::new(PurgeStrategy::default()),
        })
    }

    /// Opens an existing database, applying schema migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ChecktreeError::InvalidWorkspace`] if the file is a
    /// SQLite database without checktree tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let storage = Storage::open(&path)?;
        log::debug!("opened workspace at {}", path.as_ref().display());
        Ok(Self {
            storage,
            operation_log: OperationLog::new(PurgeStrategy::default()),
        })
    }

    /// Replaces the purge strategy used after every logged mutation.
    pub fn set_purge_strategy(&mut self, strategy: PurgeStrategy) {
        self.operation_log.set_strategy(strategy);
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        self.storage.connection()
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Fetches a node by id.
    pub fn get_node(&self, id: i64) -> Result<Node> {
        tree::get_node(self.connection(), id)
    }

    /// Returns `root` and all its descendants, root first, then ordered by
    /// `(parent_id, sort, id)`.
    pub fn get_subtree(&self, root: i64) -> Result<Vec<Node>> {
        self.get_node(root)?;
        tree::subtree(self.connection(), root)
    }

    /// Direct children of `parent_id` in sibling order; `None` lists the roots.
    pub fn get_children(&self, parent_id: Option<i64>) -> Result<Vec<Node>> {
        if let Some(parent_id) = parent_id {
            self.get_node(parent_id)?;
        }
        tree::children(self.connection(), parent_id)
    }

    /// Resolves the effective status and tags of `id` over its ancestor chain.
    pub fn get_effective(&self, id: i64) -> Result<EffectiveView> {
        effective_view(self.connection(), id)
    }

    /// Local tag-ops owned by `id`.
    pub fn get_tag_ops(&self, id: i64) -> Result<Vec<TagOp>> {
        self.get_node(id)?;
        tree::tag_ops(self.connection(), id)
    }

    /// Number of childless `WHEN` nodes in the subtree rooted at `id`.
    pub fn leaf_when_count(&self, id: i64) -> Result<usize> {
        self.get_node(id)?;
        tree::leaf_when_count(self.connection(), id)
    }

    // ── Node mutations ─────────────────────────────────────────────

    /// Creates a node and returns it as stored.
    ///
    /// Without an explicit `sort` the node is appended after its last sibling.
    ///
    /// # Errors
    ///
    /// - [`ChecktreeError::ValidationFailed`] if the title is blank, the sort
    ///   key is not finite, or the parent does not exist.
    /// - [`ChecktreeError::InvalidMove`] if the parent is a `WHEN`.
    pub fn create_node(&mut self, new: NewNode) -> Result<Node> {
        validate_title(&new.title)?;
        validate_sort(new.sort)?;
        let now = chrono::Utc::now().timestamp();

        let tx = self.storage.connection_mut().transaction()?;
        if let Some(parent_id) = new.parent_id {
            validate_parent(&tx, parent_id)?;
        }
        let sort = match new.sort {
            Some(sort) => sort,
            None => ordering::append_sort(&tx, new.parent_id)?,
        };
        let id = tree::insert_node(&tx, &new, sort, now)?;

        let op = Operation::CreateNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            node_id: id,
            parent_id: new.parent_id,
            node_type: new.node_type,
            title: new.title.clone(),
            sort,
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        self.get_node(id)
    }

    /// Applies a partial update to a node's own fields.
    ///
    /// The expected `version`, when supplied, is checked first; a patch that
    /// changes nothing then returns the node unchanged without a version
    /// bump. Moving a node (`parent_id`) without a `sort` appends it to its
    /// new sibling group.
    ///
    /// # Errors
    ///
    /// - [`ChecktreeError::NodeNotFound`] if `id` does not exist.
    /// - [`ChecktreeError::VersionConflict`] if the expected version is stale.
    /// - [`ChecktreeError::ValidationFailed`] for a blank title, a sort key
    ///   that is not finite, a missing new parent, or a node named as its own
    ///   parent.
    /// - [`ChecktreeError::InvalidMove`] if the new parent is a descendant of
    ///   the node or a `WHEN`.
    pub fn update_node(&mut self, id: i64, patch: NodePatch) -> Result<Node> {
        validate_sort(patch.sort)?;
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        let current = tree::get_node(&tx, id)?;
        if let Some(expected) = patch.version {
            if expected != current.version {
                return Err(ChecktreeError::VersionConflict {
                    expected,
                    current: current.version,
                });
            }
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let title = match &patch.title {
            Some(title) => {
                validate_title(title)?;
                title.clone()
            }
            None => current.title.clone(),
        };
        let parent_id = patch.parent_id.unwrap_or(current.parent_id);
        let moved = parent_id != current.parent_id;
        if moved {
            if let Some(new_parent) = parent_id {
                if new_parent == id {
                    return Err(ChecktreeError::ValidationFailed(format!(
                        "node {id} cannot be its own parent"
                    )));
                }
                validate_parent(&tx, new_parent)?;
                if tree::subtree_ids(&tx, id)?.contains(&new_parent) {
                    return Err(ChecktreeError::InvalidMove(format!(
                        "node {new_parent} is a descendant of node {id}"
                    )));
                }
            }
        }
        let sort = match patch.sort {
            Some(sort) => sort,
            None if moved => ordering::append_sort(&tx, parent_id)?,
            None => current.sort,
        };

        tx.execute(
            "UPDATE node SET parent_id = ?1, title = ?2, description = ?3, note = ?4, sort = ?5,
                             explicit_status = ?6
             WHERE id = ?7",
            params![
                parent_id,
                title,
                patch.description.clone().unwrap_or(current.description),
                patch.note.clone().unwrap_or(current.note),
                sort,
                patch.explicit_status.unwrap_or(current.explicit_status),
                id,
            ],
        )?;
        tree::bump_version(&tx, id, now)?;

        let op = Operation::UpdateNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            node_id: id,
            patch,
            version: current.version + 1,
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        self.get_node(id)
    }

    /// Deletes `id` together with its whole subtree and their tag-ops.
    ///
    /// # Errors
    ///
    /// Returns [`ChecktreeError::NodeNotFound`] if `id` does not exist. The
    /// transaction is rolled back automatically on any failure.
    pub fn delete_node(&mut self, id: i64) -> Result<DeleteResult> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        tree::get_node(&tx, id)?;
        let mut affected_ids = tree::subtree_ids(&tx, id)?;
        affected_ids.retain(|&n| n != id);
        affected_ids.sort_unstable();
        affected_ids.insert(0, id);

        // Foreign keys cascade to descendants and node_tag rows.
        tx.execute("DELETE FROM node WHERE id = ?1", [id])?;

        let op = Operation::DeleteNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            node_id: id,
            deleted_count: affected_ids.len(),
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        Ok(DeleteResult {
            deleted_count: affected_ids.len(),
            affected_ids,
        })
    }

    // ── Tag mutations ──────────────────────────────────────────────

    /// Replaces all local tag-ops of `id` and returns its new effective view.
    ///
    /// Tags are stored as given; a blank tag rejects the whole request.
    pub fn replace_tag_ops(&mut self, id: i64, ops: Vec<TagOp>) -> Result<EffectiveView> {
        let ops = ops
            .into_iter()
            .map(TagOp::validated)
            .collect::<Result<Vec<_>>>()?;
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        tree::get_node(&tx, id)?;
        tx.execute("DELETE FROM node_tag WHERE node_id = ?1", [id])?;
        for op in &ops {
            tree::insert_tag_op(&tx, id, op)?;
        }
        tree::bump_version(&tx, id, now)?;

        let op = Operation::ReplaceTags {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            node_id: id,
            ops,
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        self.get_effective(id)
    }

    /// Inserts or deletes one local tag-op on `id` and returns its new effective view.
    ///
    /// The node's version is bumped even when the row already existed (add)
    /// or was absent (delete).
    pub fn apply_tag_op(&mut self, id: i64, request: TagOpRequest) -> Result<EffectiveView> {
        let tag_op = TagOp { tag: request.tag, op: request.op }.validated()?;
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        tree::get_node(&tx, id)?;
        match request.action {
            TagAction::Add => tree::insert_tag_op(&tx, id, &tag_op)?,
            TagAction::Delete => {
                if !tree::delete_tag_op(&tx, id, &tag_op)? {
                    log::debug!("node {id} had no {} '{}' tag-op", tag_op.op.as_str(), tag_op.tag);
                }
            }
        }
        tree::bump_version(&tx, id, now)?;

        let op = Operation::UpdateTag {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            node_id: id,
            tag: tag_op.tag,
            op: tag_op.op,
            action: request.action,
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        self.get_effective(id)
    }

    // ── Structural operations ──────────────────────────────────────

    /// Copies or merges the subtree at `request.source_id` into the destination.
    ///
    /// # Errors
    ///
    /// - [`ChecktreeError::NodeNotFound`] if the source does not exist.
    /// - [`ChecktreeError::ValidationFailed`] for a missing target parent or a
    ///   `sibling_of` that is not one of its children.
    ///
    /// Placement under a `WHEN` is not an error; it shows up in
    /// [`CopyReport::skipped`].
    pub fn copy_subtree(&mut self, request: CopyRequest) -> Result<CopyReport> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        let report = copy::copy_subtree(&tx, &request, now)?;

        let op = Operation::CopySubtree {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            source_id: request.source_id,
            target_parent_id: request.target_parent_id,
            new_root_id: report.new_root_id,
            created: report.mapping.len(),
            merged: report.merged.len(),
            skipped: report.skipped.len(),
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        Ok(report)
    }

    /// Resets the sort keys of `parent_id`'s children to `0, 1, 2, …` in their
    /// current order. Returns the ids whose key changed.
    pub fn renumber_children(&mut self, parent_id: Option<i64>) -> Result<Vec<i64>> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.storage.connection_mut().transaction()?;

        if let Some(parent_id) = parent_id {
            tree::get_node(&tx, parent_id)?;
        }
        let renumbered = ordering::renumber_children(&tx, parent_id, now)?;

        let op = Operation::RenumberChildren {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: now,
            parent_id,
            renumbered: renumbered.clone(),
        };
        self.operation_log.log(&tx, &op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;

        Ok(renumbered)
    }

    // ── Operations log queries ─────────────────────────────────────

    /// Returns operation summaries matching the given filters, newest first.
    pub fn list_operations(
        &self,
        type_filter: Option<&str>,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Result<Vec<OperationSummary>> {
        self.operation_log.list(self.connection(), type_filter, since, until)
    }

    /// Deletes all operations from the log. Returns the number deleted.
    pub fn purge_all_operations(&self) -> Result<usize> {
        self.operation_log.purge_all(self.connection())
    }
}

fn effective_view(conn: &Connection, id: i64) -> Result<EffectiveView> {
    let chain = tree::ancestor_chain(conn, id)?;
    let ids: Vec<i64> = chain.iter().map(|n| n.id).collect();
    let ops = tree::chain_tag_ops(conn, &ids)?;
    Ok(overlay::resolve(&chain, &ops))
}

/// Rejects a blank title. Titles are stored verbatim since copy merges on exact match.
fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ChecktreeError::ValidationFailed(
            "title must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// NaN would be stored as NULL and infinity breaks `max + 1` appends.
fn validate_sort(sort: Option<f64>) -> Result<()> {
    match sort {
        Some(sort) if !sort.is_finite() => Err(ChecktreeError::ValidationFailed(format!(
            "sort must be a finite number, got {sort}"
        ))),
        _ => Ok(()),
    }
}

/// A parent must exist and accept children.
fn validate_parent(conn: &Connection, parent_id: i64) -> Result<()> {
    let parent = tree::find_node(conn, parent_id)?.ok_or_else(|| {
        ChecktreeError::ValidationFailed(format!("parent {parent_id} does not exist"))
    })?;
    if !parent.node_type.accepts_children() {
        return Err(ChecktreeError::InvalidMove(format!(
            "node {parent_id} is a WHEN and cannot have children"
        )));
    }
    Ok(())
}
