//! SQLite connection ownership, schema creation and on-open migrations.

use crate::{ChecktreeError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Rebuilds `node` with the current schema, keeping ids and converting
/// legacy text timestamps to Unix seconds.
const REBUILD_NODE_SQL: &str = "
    CREATE TABLE node_mig (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        parent_id       INTEGER REFERENCES node(id) ON DELETE CASCADE,
        type            TEXT NOT NULL CHECK (type IN ('GIVEN', 'WHEN_GROUP', 'WHEN')),
        title           TEXT NOT NULL,
        description     TEXT,
        note            TEXT,
        sort            REAL NOT NULL DEFAULT 0,
        explicit_status TEXT CHECK (explicit_status IN ('to do', 'in progress', 'done', 'cancelled')),
        version         INTEGER NOT NULL DEFAULT 1,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    );
    INSERT INTO node_mig (id, parent_id, type, title, description, note, sort,
                          explicit_status, version, created_at, updated_at)
    SELECT id, parent_id, type, title, description, note, sort, explicit_status, version,
           CASE WHEN typeof(created_at) = 'text'
                THEN CAST(strftime('%s', created_at) AS INTEGER) ELSE created_at END,
           CASE WHEN typeof(updated_at) = 'text'
                THEN CAST(strftime('%s', updated_at) AS INTEGER) ELSE updated_at END
    FROM node;
    DROP TABLE node;
    ALTER TABLE node_mig RENAME TO node;
    CREATE INDEX IF NOT EXISTS idx_node_parent ON node(parent_id);
    CREATE INDEX IF NOT EXISTS idx_node_type   ON node(type);
";

/// Owns the SQLite connection behind a [`Workspace`](crate::Workspace).
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Creates (or re-initialises) the schema at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    /// Opens an existing database, validating its tables and applying migrations.
    ///
    /// # Errors
    ///
    /// Returns [`ChecktreeError::InvalidWorkspace`] if the `node` and
    /// `node_tag` tables are missing, or [`ChecktreeError::Database`] if the
    /// file is not a SQLite database at all.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = Connection::open(path)?;

        // Validate database structure
        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='table'
             AND name IN ('node', 'node_tag')",
            [],
            |row| row.get(0),
        )?;
        if table_count != 2 {
            return Err(ChecktreeError::InvalidWorkspace(
                "Not a valid checktree database".to_string(),
            ));
        }

        migrate(&mut conn)?;
        configure(&conn)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Per-connection pragmas; foreign keys must be on for cascading deletes.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("journal_mode = {mode}");
    Ok(())
}

fn migrate(conn: &mut Connection) -> Result<()> {
    // Migrate: add note column if it doesn't exist
    let has_note: bool = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('node') WHERE name='note'",
        [],
        |row| row.get::<_, i64>(0).map(|count| count > 0),
    )?;
    if !has_note {
        log::info!("migrating: adding node.note column");
        conn.execute("ALTER TABLE node ADD COLUMN note TEXT", [])?;
    }

    // Migrate: status CHECK constraint predating 'cancelled'
    let table_sql: String = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name='node'",
        [],
        |row| row.get(0),
    )?;
    if table_sql.contains("explicit_status IN") && !table_sql.contains("cancelled") {
        log::info!("migrating: rebuilding node table to allow 'cancelled' status");
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        let rebuilt = (|| -> Result<()> {
            let tx = conn.transaction()?;
            tx.execute_batch(REBUILD_NODE_SQL)?;
            tx.commit()?;
            Ok(())
        })();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        rebuilt?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_create_storage() {
        let temp = NamedTempFile::new().unwrap();
        let storage = Storage::create(temp.path()).unwrap();

        let tables = table_names(storage.connection());
        assert!(tables.contains(&"node".to_string()));
        assert!(tables.contains(&"node_tag".to_string()));
        assert!(tables.contains(&"operations".to_string()));

        let fk: i64 = storage
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_open_existing_storage() {
        let temp = NamedTempFile::new().unwrap();
        Storage::create(temp.path()).unwrap();

        let storage = Storage::open(temp.path()).unwrap();
        let tables = table_names(storage.connection());
        assert!(tables.contains(&"node".to_string()));
        assert!(tables.contains(&"operations".to_string()));
    }

    #[test]
    fn test_open_invalid_database() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "not a database").unwrap();
        assert!(Storage::open(temp.path()).is_err());
    }

    #[test]
    fn test_open_foreign_database_is_invalid_workspace() {
        let temp = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute("CREATE TABLE notes (id TEXT PRIMARY KEY)", []).unwrap();
        }
        assert!(matches!(
            Storage::open(temp.path()),
            Err(ChecktreeError::InvalidWorkspace(_))
        ));
    }

    #[test]
    fn test_migration_adds_note_and_cancelled() {
        let temp = NamedTempFile::new().unwrap();

        // Legacy layout: no note column, no 'cancelled', text timestamps.
        {
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE node (
                    id              INTEGER PRIMARY KEY,
                    parent_id       INTEGER REFERENCES node(id) ON DELETE CASCADE,
                    type            TEXT NOT NULL CHECK (type IN ('GIVEN','WHEN_GROUP','WHEN')),
                    title           TEXT NOT NULL,
                    description     TEXT,
                    sort            INTEGER NOT NULL DEFAULT 0,
                    explicit_status TEXT CHECK (explicit_status IN ('to do','in progress','done')),
                    version         INTEGER NOT NULL DEFAULT 1,
                    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
                );
                CREATE TABLE node_tag (
                    node_id INTEGER NOT NULL REFERENCES node(id) ON DELETE CASCADE,
                    tag     TEXT NOT NULL,
                    op      TEXT NOT NULL CHECK (op IN ('add','remove')),
                    PRIMARY KEY (node_id, tag, op)
                );
                INSERT INTO node (parent_id, type, title, sort, explicit_status, created_at, updated_at)
                VALUES (NULL, 'GIVEN', 'Root GIVEN', 0, 'to do', '2024-01-02 03:04:05', '2024-01-02 03:04:05');
                INSERT INTO node_tag (node_id, tag, op) VALUES (1, 'smoke', 'add');",
            )
            .unwrap();
        }

        let storage = Storage::open(temp.path()).unwrap();
        let conn = storage.connection();

        let has_note: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('node') WHERE name='note'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has_note, 1, "note column should exist after migration");

        conn.execute("UPDATE node SET explicit_status = 'cancelled' WHERE id = 1", [])
            .expect("'cancelled' should be accepted after migration");

        let created_at: i64 = conn
            .query_row("SELECT created_at FROM node WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(created_at, 1_704_164_645);

        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM node_tag WHERE node_id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 1, "tag rows survive the rebuild");
    }
}
