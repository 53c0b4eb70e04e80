//! CLI settings persistence.
//!
//! Stores the default database location and the operation-log retention in a
//! JSON file at an OS-appropriate location.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Operations kept in the log when the settings file does not say otherwise.
pub const DEFAULT_KEEP_LAST: usize = 1000;

/// Persisted CLI settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliSettings {
    /// Database used when neither `--db` nor `CHECKTREE_DB` is given.
    pub database_path: String,
    /// How many operations the log retains.
    pub operation_log_keep_last: usize,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path().to_string_lossy().to_string(),
            operation_log_keep_last: DEFAULT_KEEP_LAST,
        }
    }
}

/// Returns the path to the settings JSON file.
///
/// - macOS / Linux: `~/.config/checktree/settings.json`
/// - Windows: `%APPDATA%/Checktree/settings.json`
pub fn settings_file_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("Checktree").join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("checktree").join("settings.json")
    }
}

/// Returns the default database path: `<data dir>/checktree/checktree.db`.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("checktree")
        .join("checktree.db")
}

/// Loads settings from disk; returns defaults if the file is missing or corrupt.
pub fn load_settings() -> CliSettings {
    let path = settings_file_path();
    match fs::read_to_string(&path) {
        Ok(content) => parse_settings(&content),
        Err(_) => CliSettings::default(),
    }
}

fn parse_settings(content: &str) -> CliSettings {
    serde_json::from_str(content).unwrap_or_else(|e| {
        tracing::warn!("ignoring corrupt settings file: {e}");
        CliSettings::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings = parse_settings(r#"{"databasePath": "/tmp/x.db"}"#);
        assert_eq!(settings.database_path, "/tmp/x.db");
        assert_eq!(settings.operation_log_keep_last, DEFAULT_KEEP_LAST);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        assert_eq!(parse_settings("{not json"), CliSettings::default());
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let json = serde_json::to_string(&CliSettings::default()).unwrap();
        assert!(json.contains("databasePath"));
        assert!(json.contains("operationLogKeepLast"));
    }
}
