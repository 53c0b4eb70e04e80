//! Durable operation log and purge strategies.

use crate::{Operation, Result};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};

/// Seconds in one day; used to convert `retention_days` to a Unix timestamp cutoff.
const SECONDS_PER_DAY: i64 = 86_400;

/// Controls which old operations are removed from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeStrategy {
    /// Retain only the most recent `keep_last` operations.
    KeepLast { keep_last: usize },
    /// Retain operations for `retention_days` before removing them.
    RetainDays { retention_days: u32 },
}

impl Default for PurgeStrategy {
    fn default() -> Self {
        Self::KeepLast { keep_last: 1000 }
    }
}

/// One row of the `operations` table, decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub id: i64,
    pub operation_type: String,
    pub timestamp: i64,
    pub operation: Operation,
}

/// Records tree mutations to the `operations` table and purges stale entries.
#[derive(Debug)]
pub struct OperationLog {
    strategy: PurgeStrategy,
}

impl OperationLog {
    /// Creates a new `OperationLog` with the given purge strategy.
    pub fn new(strategy: PurgeStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> PurgeStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: PurgeStrategy) {
        self.strategy = strategy;
    }

    /// Serialises `op` and appends it to the `operations` table within `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ChecktreeError::Database`] if the INSERT fails, or
    /// [`crate::ChecktreeError::Json`] if `op` cannot be serialised.
    pub fn log(&self, tx: &Transaction, op: &Operation) -> Result<()> {
        let op_json = serde_json::to_string(op)?;

        tx.execute(
            "INSERT INTO operations (operation_id, timestamp, operation_type, operation_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![op.operation_id(), op.timestamp(), op.type_name(), op_json],
        )?;
        log::info!("{} committed ({})", op.type_name(), op.operation_id());

        Ok(())
    }

    /// Deletes old operations from the log according to the purge strategy.
    ///
    /// Call this after every [`log`](Self::log) call to keep the table bounded in size.
    pub fn purge_if_needed(&self, tx: &Transaction) -> Result<()> {
        match self.strategy {
            PurgeStrategy::KeepLast { keep_last } => {
                tx.execute(
                    "DELETE FROM operations WHERE id NOT IN (
                        SELECT id FROM operations ORDER BY id DESC LIMIT ?1
                    )",
                    [keep_last as i64],
                )?;
            }
            PurgeStrategy::RetainDays { retention_days } => {
                let cutoff =
                    chrono::Utc::now().timestamp() - (i64::from(retention_days) * SECONDS_PER_DAY);
                tx.execute("DELETE FROM operations WHERE timestamp < ?1", [cutoff])?;
            }
        }
        Ok(())
    }

    /// Returns logged operations newest first, optionally filtered by type and time range.
    pub fn list(
        &self,
        conn: &Connection,
        type_filter: Option<&str>,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Result<Vec<OperationSummary>> {
        let mut stmt = conn.prepare(
            "SELECT id, operation_type, timestamp, operation_data FROM operations
             WHERE (?1 IS NULL OR operation_type = ?1)
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map(params![type_filter, since, until], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, operation_type, timestamp, data)| {
                Ok(OperationSummary {
                    id,
                    operation_type,
                    timestamp,
                    operation: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    /// Deletes every logged operation, returning how many were removed.
    pub fn purge_all(&self, conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM operations", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeType, Storage};
    use tempfile::NamedTempFile;

    fn create_op(i: i64, timestamp: i64) -> Operation {
        Operation::CreateNode {
            operation_id: format!("op-{i}"),
            timestamp,
            node_id: i,
            parent_id: None,
            node_type: NodeType::Given,
            title: format!("Node {i}"),
            sort: i as f64,
        }
    }

    #[test]
    fn test_log_and_purge() {
        let temp = NamedTempFile::new().unwrap();
        let mut storage = Storage::create(temp.path()).unwrap();
        let log = OperationLog::new(PurgeStrategy::KeepLast { keep_last: 5 });

        let tx = storage.connection_mut().transaction().unwrap();
        for i in 0..10 {
            log.log(&tx, &create_op(i, 1000 + i)).unwrap();
        }
        log.purge_if_needed(&tx).unwrap();
        tx.commit().unwrap();

        let ops = log.list(storage.connection(), None, None, None).unwrap();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[0].operation.operation_id(), "op-9", "newest first");
    }

    #[test]
    fn test_retain_days_drops_old_entries() {
        let temp = NamedTempFile::new().unwrap();
        let mut storage = Storage::create(temp.path()).unwrap();
        let log = OperationLog::new(PurgeStrategy::RetainDays { retention_days: 1 });
        let now = chrono::Utc::now().timestamp();

        let tx = storage.connection_mut().transaction().unwrap();
        log.log(&tx, &create_op(1, now - 3 * SECONDS_PER_DAY)).unwrap();
        log.log(&tx, &create_op(2, now)).unwrap();
        log.purge_if_needed(&tx).unwrap();
        tx.commit().unwrap();

        let ops = log.list(storage.connection(), None, None, None).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation.operation_id(), "op-2");
    }

    #[test]
    fn test_list_filters_by_type_and_time() {
        let temp = NamedTempFile::new().unwrap();
        let mut storage = Storage::create(temp.path()).unwrap();
        let log = OperationLog::new(PurgeStrategy::default());

        let tx = storage.connection_mut().transaction().unwrap();
        log.log(&tx, &create_op(1, 100)).unwrap();
        log.log(
            &tx,
            &Operation::DeleteNode {
                operation_id: "del".to_string(),
                timestamp: 200,
                node_id: 1,
                deleted_count: 1,
            },
        )
        .unwrap();
        tx.commit().unwrap();

        let deletes = log.list(storage.connection(), Some("DeleteNode"), None, None).unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].operation_type, "DeleteNode");
        let early = log.list(storage.connection(), None, None, Some(150)).unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(log.purge_all(storage.connection()).unwrap(), 2);
    }
}
