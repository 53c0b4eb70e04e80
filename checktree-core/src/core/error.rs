//! Error types for the checktree core library.

use thiserror::Error;

/// All errors that can occur within the checktree core library.
#[derive(Debug, Error)]
pub enum ChecktreeError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A node ID was requested that does not exist in the database.
    #[error("Node not found: {0}")]
    NodeNotFound(i64),

    /// A request was rejected before any write because its input is invalid.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A placement would create a cycle or attach a child under a `WHEN` node.
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// The caller's expected version does not match the stored one.
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: i64, current: i64 },

    /// The opened file is not a valid checktree database.
    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`ChecktreeError`].
pub type Result<T> = std::result::Result<T, ChecktreeError>;

impl ChecktreeError {
    /// Coarse error class used by request layers to pick a status code.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "not_found",
            Self::ValidationFailed(_) | Self::InvalidMove(_) => "validation",
            Self::VersionConflict { .. } => "conflict",
            Self::Database(_) | Self::InvalidWorkspace(_) | Self::Io(_) | Self::Json(_) => {
                "internal"
            }
        }
    }

    /// The stored version carried by a conflict, so callers can re-fetch and retry.
    #[must_use]
    pub fn current_version(&self) -> Option<i64> {
        match self {
            Self::VersionConflict { current, .. } => Some(*current),
            _ => None,
        }
    }

    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::NodeNotFound(id) => format!("Node {id} no longer exists"),
            Self::ValidationFailed(msg) => msg.clone(),
            Self::InvalidMove(msg) => msg.clone(),
            Self::VersionConflict { current, .. } => {
                format!("Node was changed elsewhere (now at version {current}); reload and retry")
            }
            Self::InvalidWorkspace(_) => "Could not open checktree database".to_string(),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ChecktreeError::NodeNotFound(7).kind(), "not_found");
        assert_eq!(ChecktreeError::ValidationFailed("x".into()).kind(), "validation");
        assert_eq!(ChecktreeError::InvalidMove("x".into()).kind(), "validation");
        assert_eq!(
            ChecktreeError::VersionConflict { expected: 1, current: 3 }.kind(),
            "conflict"
        );
        assert_eq!(ChecktreeError::InvalidWorkspace("x".into()).kind(), "internal");
    }

    #[test]
    fn test_conflict_carries_current_version() {
        let e = ChecktreeError::VersionConflict { expected: 2, current: 5 };
        assert_eq!(e.current_version(), Some(5));
        assert!(e.to_string().contains("current 5"));
        assert_eq!(ChecktreeError::NodeNotFound(1).current_version(), None);
    }
}
