//! Node record and the enumerations stored on it.

use crate::{ChecktreeError, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of checklist node.
///
/// `When` is leaf-only: no node may ever be attached under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Given,
    WhenGroup,
    When,
}

impl NodeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Given => "GIVEN",
            Self::WhenGroup => "WHEN_GROUP",
            Self::When => "WHEN",
        }
    }

    /// Whether nodes of this type may have children.
    #[must_use]
    pub fn accepts_children(self) -> bool {
        !matches!(self, Self::When)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ChecktreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GIVEN" => Ok(Self::Given),
            "WHEN_GROUP" => Ok(Self::WhenGroup),
            "WHEN" => Ok(Self::When),
            other => Err(ChecktreeError::ValidationFailed(format!(
                "type must be GIVEN | WHEN_GROUP | WHEN, got '{other}'"
            ))),
        }
    }
}

/// Checklist status. Stored as nullable text; `None` on a node means "inherit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "to do")]
    ToDo,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl Status {
    /// Status reported when no node on the ancestor chain sets one explicitly.
    pub const DEFAULT: Status = Status::ToDo;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "to do",
            Self::InProgress => "in progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ChecktreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "to do" => Ok(Self::ToDo),
            "in progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ChecktreeError::ValidationFailed(format!(
                "explicit_status must be 'to do' | 'in progress' | 'done' | 'cancelled' or null, got '{other}'"
            ))),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<Self>()
                    .map_err(|e| FromSqlError::Other(e.to_string().into()))
            }
        }
    };
}

text_column!(NodeType);
text_column!(Status);

/// A checklist node as stored in the `node` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub parent_id: Option<i64>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    pub description: Option<String>,
    pub note: Option<String>,
    pub sort: f64,
    pub explicit_status: Option<Status>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a node.
///
/// `sort` defaults to appending after the parent's last child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub explicit_status: Option<Status>,
    #[serde(default)]
    pub sort: Option<f64>,
}

impl NewNode {
    /// A node with only the required fields set.
    pub fn new(parent_id: Option<i64>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            parent_id,
            node_type,
            title: title.into(),
            description: None,
            note: None,
            explicit_status: None,
            sort: None,
        }
    }
}

/// A partial update of a node's own fields.
///
/// Outer `None` leaves a field untouched; for nullable columns `Some(None)`
/// clears it (for `explicit_status` that means "inherit", for `parent_id`
/// "move to root").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub explicit_status: Option<Option<Status>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<f64>,
    /// Expected stored version; a mismatch rejects the whole patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl NodePatch {
    /// True when the patch would not change any column.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.note.is_none()
            && self.explicit_status.is_none()
            && self.parent_id.is_none()
            && self.sort.is_none()
    }
}

/// Distinguishes an explicit JSON `null` (`Some(None)`) from an absent key (`None`).
fn double_option<'de, D, T>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trips_through_text() {
        for t in [NodeType::Given, NodeType::WhenGroup, NodeType::When] {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!(matches!(
            "when".parse::<NodeType>(),
            Err(ChecktreeError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_only_when_rejects_children() {
        assert!(NodeType::Given.accepts_children());
        assert!(NodeType::WhenGroup.accepts_children());
        assert!(!NodeType::When.accepts_children());
    }

    #[test]
    fn test_status_serializes_with_spaces() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, r#""in progress""#);
        assert_eq!("cancelled".parse::<Status>().unwrap(), Status::Cancelled);
        assert!("blocked".parse::<Status>().is_err());
    }

    #[test]
    fn test_node_serializes_type_key() {
        let node = Node {
            id: 1,
            parent_id: None,
            node_type: NodeType::WhenGroup,
            title: "Root".to_string(),
            description: None,
            note: None,
            sort: 0.0,
            explicit_status: Some(Status::ToDo),
            version: 1,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "WHEN_GROUP");
        assert_eq!(json["explicit_status"], "to do");
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: NodePatch =
            serde_json::from_str(r#"{"explicit_status": null, "title": "T"}"#).unwrap();
        assert_eq!(patch.explicit_status, Some(None));
        assert_eq!(patch.parent_id, None);
        assert_eq!(patch.title.as_deref(), Some("T"));

        let patch: NodePatch = serde_json::from_str(r#"{"parent_id": 4}"#).unwrap();
        assert_eq!(patch.parent_id, Some(Some(4)));
    }

    #[test]
    fn test_empty_patch_ignores_version() {
        let patch = NodePatch { version: Some(3), ..NodePatch::default() };
        assert!(patch.is_empty());
    }
}
