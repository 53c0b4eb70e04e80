//! Recursive copy-or-merge of a subtree into a destination parent.
//!
//! A source node whose title matches an existing child of the destination is
//! folded into that child instead of being duplicated; its children are then
//! copied or merged beneath the existing node. Nodes are never placed under a
//! `WHEN`; such attempts are recorded in [`CopyReport::skipped`] rather than
//! failing the request.
//!
//! The source subtree and its tag-ops are loaded into memory before the first
//! write, so copying a subtree into itself copies it exactly as it was when
//! the request started.

use crate::core::ordering::{self, Placement};
use crate::core::tree;
use crate::{ChecktreeError, NewNode, Node, NodeType, Result, TagOp};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Parameters for [`Workspace::copy_subtree`](crate::Workspace::copy_subtree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    pub source_id: i64,
    /// Destination parent; `None` copies into the root scope.
    #[serde(default)]
    pub target_parent_id: Option<i64>,
    /// Existing child of the destination after which the copied root is placed.
    #[serde(default)]
    pub sibling_of: Option<i64>,
}

/// A source node folded into an existing same-titled destination node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPair {
    pub source_id: i64,
    pub target_id: i64,
}

/// Why a source node was not copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    #[serde(rename = "dest_parent_is_WHEN")]
    DestParentIsWhen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedNode {
    pub source_id: i64,
    pub reason: SkipReason,
}

/// Audit of a copy: what was created, what was merged and what was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReport {
    /// First created node, or else the first merge target.
    pub new_root_id: Option<i64>,
    /// Holds at most the first created node.
    pub created_roots: Vec<i64>,
    /// Source id to new id, for every created node.
    pub mapping: BTreeMap<i64, i64>,
    pub merged: Vec<MergedPair>,
    pub skipped: Vec<SkippedNode>,
}

enum Visit {
    Created(i64),
    Merged,
}

/// Checks the top-level contract of `req` without writing anything.
///
/// # Errors
///
/// - [`ChecktreeError::NodeNotFound`] if the source does not exist.
/// - [`ChecktreeError::ValidationFailed`] if the target parent does not exist,
///   or `sibling_of` does not exist or is not a child of the target parent.
pub fn validate(conn: &Connection, req: &CopyRequest) -> Result<()> {
    tree::get_node(conn, req.source_id)?;

    if let Some(target) = req.target_parent_id {
        if tree::find_node(conn, target)?.is_none() {
            return Err(ChecktreeError::ValidationFailed(format!(
                "target parent {target} does not exist"
            )));
        }
    }

    if let Some(sibling_id) = req.sibling_of {
        let sibling = tree::find_node(conn, sibling_id)?.ok_or_else(|| {
            ChecktreeError::ValidationFailed(format!("sibling_of {sibling_id} does not exist"))
        })?;
        if sibling.parent_id != req.target_parent_id {
            return Err(ChecktreeError::ValidationFailed(format!(
                "sibling_of {sibling_id} is not a child of the target parent"
            )));
        }
    }
    Ok(())
}

/// Validates `req`, then copies or merges the source subtree into the
/// destination. Callers wrap this in a transaction.
pub fn copy_subtree(conn: &Connection, req: &CopyRequest, now: i64) -> Result<CopyReport> {
    validate(conn, req)?;
    let mut engine = CopyEngine::load(conn, req.source_id, now)?;
    engine.visit(req.source_id, req.target_parent_id, Placement::from(req.sibling_of))?;
    Ok(engine.finish())
}

/// Snapshot of the source subtree plus the report being accumulated.
struct CopyEngine<'a> {
    conn: &'a Connection,
    now: i64,
    nodes: HashMap<i64, Node>,
    children: HashMap<i64, Vec<i64>>,
    tag_ops: HashMap<i64, Vec<TagOp>>,
    report: CopyReport,
}

impl<'a> CopyEngine<'a> {
    fn load(conn: &'a Connection, source_id: i64, now: i64) -> Result<Self> {
        let subtree = tree::subtree(conn, source_id)?;
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut tag_ops = HashMap::new();
        // `subtree` is ordered by (parent_id, sort, id), so each child list
        // comes out in sibling order.
        for node in &subtree {
            if node.id != source_id {
                if let Some(parent_id) = node.parent_id {
                    children.entry(parent_id).or_default().push(node.id);
                }
            }
            tag_ops.insert(node.id, tree::tag_ops(conn, node.id)?);
        }
        log::debug!("copy snapshot of node {source_id}: {} nodes", subtree.len());

        Ok(Self {
            conn,
            now,
            nodes: subtree.into_iter().map(|n| (n.id, n)).collect(),
            children,
            tag_ops,
            report: CopyReport::default(),
        })
    }

    fn visit(
        &mut self,
        source_id: i64,
        dest_parent: Option<i64>,
        placement: Placement,
    ) -> Result<Option<Visit>> {
        let Some(source) = self.nodes.get(&source_id).cloned() else {
            return Ok(None);
        };

        if let Some(parent_id) = dest_parent {
            if tree::get_node(self.conn, parent_id)?.node_type == NodeType::When {
                log::warn!("not copying node {source_id}: destination {parent_id} is a WHEN");
                self.report.skipped.push(SkippedNode {
                    source_id,
                    reason: SkipReason::DestParentIsWhen,
                });
                return Ok(None);
            }
        }

        let kids = self.children.get(&source_id).cloned().unwrap_or_default();

        if let Some(existing) = tree::child_by_title(self.conn, dest_parent, &source.title)? {
            log::debug!("merging node {source_id} into existing node {}", existing.id);
            self.report.merged.push(MergedPair { source_id, target_id: existing.id });
            for child in kids {
                self.visit(child, Some(existing.id), Placement::Append)?;
            }
            return Ok(Some(Visit::Merged));
        }

        let new_id = self.insert_copy(&source, dest_parent, placement)?;
        self.report.mapping.insert(source_id, new_id);
        if self.report.created_roots.is_empty() {
            self.report.created_roots.push(new_id);
        }

        let mut last_created = None;
        for child in kids {
            if let Some(Visit::Created(id)) =
                self.visit(child, Some(new_id), Placement::from(last_created))?
            {
                last_created = Some(id);
            }
        }
        Ok(Some(Visit::Created(new_id)))
    }

    fn insert_copy(&self, source: &Node, dest_parent: Option<i64>, placement: Placement) -> Result<i64> {
        let sort = ordering::allocate(self.conn, dest_parent, placement)?;
        let new = NewNode {
            parent_id: dest_parent,
            node_type: source.node_type,
            title: source.title.clone(),
            description: source.description.clone(),
            note: None,
            explicit_status: None,
            sort: None,
        };
        let new_id = tree::insert_node(self.conn, &new, sort, self.now)?;
        for op in self.tag_ops.get(&source.id).into_iter().flatten() {
            tree::insert_tag_op(self.conn, new_id, op)?;
        }
        tree::bump_version(self.conn, new_id, self.now)?;
        Ok(new_id)
    }

    fn finish(mut self) -> CopyReport {
        self.report.new_root_id = self
            .report
            .created_roots
            .first()
            .copied()
            .or_else(|| self.report.merged.first().map(|m| m.target_id));
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Status, Storage, TagOpKind};
    use tempfile::NamedTempFile;

    fn add(conn: &Connection, parent: Option<i64>, ty: NodeType, title: &str) -> i64 {
        let sort = ordering::append_sort(conn, parent).unwrap();
        tree::insert_node(conn, &NewNode::new(parent, ty, title), sort, 10).unwrap()
    }

    fn titles(conn: &Connection, parent: i64) -> Vec<String> {
        tree::children(conn, Some(parent)).unwrap().into_iter().map(|n| n.title).collect()
    }

    fn req(source_id: i64, target: Option<i64>, sibling_of: Option<i64>) -> CopyRequest {
        CopyRequest { source_id, target_parent_id: target, sibling_of }
    }

    #[test]
    fn test_login_scenario_merges_and_creates() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let src_root = add(conn, None, NodeType::Given, "Source");
        let src_login = add(conn, Some(src_root), NodeType::WhenGroup, "Login");
        let src_valid = add(conn, Some(src_login), NodeType::When, "Valid");
        let src_invalid = add(conn, Some(src_login), NodeType::When, "Invalid");

        let dst_root = add(conn, None, NodeType::Given, "Dest");
        let dst_login = add(conn, Some(dst_root), NodeType::WhenGroup, "Login");
        let dst_valid = add(conn, Some(dst_login), NodeType::When, "Valid");

        let report = copy_subtree(conn, &req(src_login, Some(dst_root), None), 20).unwrap();

        assert_eq!(
            report.merged,
            vec![
                MergedPair { source_id: src_login, target_id: dst_login },
                MergedPair { source_id: src_valid, target_id: dst_valid },
            ]
        );
        let new_invalid = report.mapping[&src_invalid];
        assert_eq!(report.mapping.len(), 1);
        assert_eq!(report.created_roots, vec![new_invalid]);
        assert_eq!(report.new_root_id, Some(new_invalid));
        assert!(report.skipped.is_empty());
        assert_eq!(titles(conn, dst_login), vec!["Valid", "Invalid"]);
        assert_eq!(tree::get_node(conn, dst_login).unwrap().version, 1, "merge target untouched");
    }

    #[test]
    fn test_copy_without_collisions_is_structurally_identical() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let src = add(conn, None, NodeType::Given, "Checkout");
        conn.execute(
            "UPDATE node SET explicit_status = 'done', note = 'private' WHERE id = ?1",
            [src],
        )
        .unwrap();
        let group = add(conn, Some(src), NodeType::WhenGroup, "Payment");
        let card = add(conn, Some(group), NodeType::When, "Card");
        let cash = add(conn, Some(group), NodeType::When, "Cash");
        tree::insert_tag_op(conn, src, &TagOp::add("smoke")).unwrap();
        tree::insert_tag_op(conn, card, &TagOp::remove("smoke")).unwrap();
        let dest = add(conn, None, NodeType::Given, "Elsewhere");

        let report = copy_subtree(conn, &req(src, Some(dest), None), 20).unwrap();

        assert!(report.merged.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(report.mapping.len(), 4);
        let new_root = report.new_root_id.unwrap();
        assert_eq!(report.mapping[&src], new_root);
        assert_eq!(report.created_roots, vec![new_root]);

        let copy = tree::subtree(conn, new_root).unwrap();
        let shape: Vec<(NodeType, &str)> =
            copy.iter().map(|n| (n.node_type, n.title.as_str())).collect();
        assert_eq!(
            shape,
            vec![
                (NodeType::Given, "Checkout"),
                (NodeType::WhenGroup, "Payment"),
                (NodeType::When, "Card"),
                (NodeType::When, "Cash"),
            ]
        );
        for node in &copy {
            assert_eq!(node.explicit_status, None::<Status>);
            assert_eq!(node.note, None, "notes stay with the source");
            assert_eq!(node.version, 2);
        }
        assert_eq!(tree::tag_ops(conn, new_root).unwrap(), vec![TagOp::add("smoke")]);
        let new_card = report.mapping[&card];
        assert_eq!(tree::tag_ops(conn, new_card).unwrap()[0].op, TagOpKind::Remove);
        assert!(report.mapping.contains_key(&cash));
    }

    #[test]
    fn test_copy_under_when_is_skipped() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let root = add(conn, None, NodeType::Given, "R");
        let leaf = add(conn, Some(root), NodeType::When, "Leaf");
        let src = add(conn, Some(root), NodeType::Given, "G");

        let report = copy_subtree(conn, &req(src, Some(leaf), None), 20).unwrap();

        assert_eq!(
            report.skipped,
            vec![SkippedNode { source_id: src, reason: SkipReason::DestParentIsWhen }]
        );
        assert!(report.created_roots.is_empty());
        assert_eq!(report.new_root_id, None);
        assert!(tree::children(conn, Some(leaf)).unwrap().is_empty());
        let json = serde_json::to_string(&report.skipped[0]).unwrap();
        assert!(json.contains(r#""reason":"dest_parent_is_WHEN""#));
    }

    #[test]
    fn test_sibling_of_places_copy_and_children_chain() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let dest = add(conn, None, NodeType::Given, "Dest");
        let first = add(conn, Some(dest), NodeType::Given, "First");
        add(conn, Some(dest), NodeType::Given, "Last");
        let src = add(conn, None, NodeType::Given, "Copied");
        add(conn, Some(src), NodeType::When, "a");
        add(conn, Some(src), NodeType::When, "b");
        add(conn, Some(src), NodeType::When, "c");

        let report = copy_subtree(conn, &req(src, Some(dest), Some(first)), 20).unwrap();

        assert_eq!(titles(conn, dest), vec!["First", "Copied", "Last"]);
        let new_root = report.new_root_id.unwrap();
        assert_eq!(tree::get_node(conn, new_root).unwrap().sort, 0.5);
        let sorts: Vec<f64> =
            tree::children(conn, Some(new_root)).unwrap().iter().map(|n| n.sort).collect();
        assert_eq!(sorts, vec![0.0, 0.5, 1.0]);
        assert_eq!(titles(conn, new_root), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_copy_into_itself_terminates() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let a = add(conn, None, NodeType::Given, "A");
        let b = add(conn, Some(a), NodeType::Given, "B");
        add(conn, Some(b), NodeType::When, "W");

        let report = copy_subtree(conn, &req(a, Some(a), None), 20).unwrap();

        assert_eq!(report.mapping.len(), 3);
        let new_a = report.new_root_id.unwrap();
        assert_eq!(titles(conn, a), vec!["B", "A"]);
        assert_eq!(titles(conn, new_a), vec!["B"]);
        assert_eq!(tree::subtree_ids(conn, a).unwrap().len(), 6);
    }

    #[test]
    fn test_validation_errors_precede_writes() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();
        let conn = storage.connection();

        let root = add(conn, None, NodeType::Given, "R");
        let other = add(conn, None, NodeType::Given, "Other");
        let stray = add(conn, Some(other), NodeType::Given, "Stray");
        let src = add(conn, Some(root), NodeType::Given, "S");

        assert!(matches!(
            copy_subtree(conn, &req(999, Some(root), None), 20),
            Err(ChecktreeError::NodeNotFound(999))
        ));
        assert!(matches!(
            copy_subtree(conn, &req(src, Some(999), None), 20),
            Err(ChecktreeError::ValidationFailed(_))
        ));
        assert!(matches!(
            copy_subtree(conn, &req(src, Some(root), Some(999)), 20),
            Err(ChecktreeError::ValidationFailed(_))
        ));
        assert!(matches!(
            copy_subtree(conn, &req(src, Some(root), Some(stray)), 20),
            Err(ChecktreeError::ValidationFailed(_))
        ));
        assert_eq!(titles(conn, root), vec!["S"]);
    }
}
