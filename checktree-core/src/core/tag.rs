//! Local tag assertions and the effective-view record.

use crate::{ChecktreeError, Result, Status};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether a tag-op declares a tag or retracts it for the subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagOpKind {
    Add,
    Remove,
}

impl TagOpKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl FromStr for TagOpKind {
    type Err = ChecktreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            other => Err(ChecktreeError::ValidationFailed(format!(
                "op must be 'add' | 'remove', got '{other}'"
            ))),
        }
    }
}

impl ToSql for TagOpKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TagOpKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<Self>()
            .map_err(|e| FromSqlError::Other(e.to_string().into()))
    }
}

/// One `(tag, op)` row owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagOp {
    pub tag: String,
    pub op: TagOpKind,
}

impl TagOp {
    pub fn add(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), op: TagOpKind::Add }
    }

    pub fn remove(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), op: TagOpKind::Remove }
    }

    /// Rejects a tag that is blank; any other tag is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ChecktreeError::ValidationFailed`] for a blank tag.
    pub fn validated(self) -> Result<Self> {
        if self.tag.trim().is_empty() {
            return Err(ChecktreeError::ValidationFailed(
                "tag must be a non-empty string".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Whether a single tag-op row is inserted or deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    #[default]
    Add,
    Delete,
}

impl FromStr for TagAction {
    type Err = ChecktreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            other => Err(ChecktreeError::ValidationFailed(format!(
                "action must be 'add' or 'delete', got '{other}'"
            ))),
        }
    }
}

/// Request to insert or delete one local tag-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagOpRequest {
    pub tag: String,
    pub op: TagOpKind,
    #[serde(default)]
    pub action: TagAction,
}

/// Status and tags a node ends up with after inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveView {
    pub status: Status,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_keeps_tag_verbatim() {
        let op = TagOp::add("  smoke ").validated().unwrap();
        assert_eq!(op.tag, "  smoke ");
        assert_eq!(op.op, TagOpKind::Add);
    }

    #[test]
    fn test_validated_rejects_blank() {
        assert!(matches!(
            TagOp::remove("   ").validated(),
            Err(ChecktreeError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_request_action_defaults_to_add() {
        let req: TagOpRequest = serde_json::from_str(r#"{"tag":"ui","op":"remove"}"#).unwrap();
        assert_eq!(req.action, TagAction::Add);
        assert_eq!(req.op, TagOpKind::Remove);
        assert!(serde_json::from_str::<TagOpRequest>(r#"{"tag":"ui","op":"drop"}"#).is_err());
    }
}
