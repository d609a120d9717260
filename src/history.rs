//! Linear undo/redo log over the record store.
//!
//! Operations at positions `< applied` have been applied and undo in reverse
//! order; positions `>= applied` are redo-able. Appending while not at the tail
//! drops the redo branch.
//!
//! The log is kept in the same database as the records (`history` rows plus
//! the `history_applied` metadata key), so a mutation and its log entry commit
//! or roll back together.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::replace_store_from_text;
use crate::db::{get_metadata, set_metadata};
use crate::error::{LedgerError, Result};
use crate::models::TransactionRecord;
use crate::store::RecordStore;

const APPLIED_KEY: &str = "history_applied";

/// A mutation about to be applied, before its undo data is captured.
#[derive(Debug, Clone)]
pub enum Mutation {
    Add(TransactionRecord),
    Update(TransactionRecord),
    Delete(String),
    BulkReplace { backup: PathBuf, source_text: String },
}

/// Undo removes `id`; redo inserts `record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPayload {
    pub id: String,
    pub record: TransactionRecord,
}

/// Undo writes back `prior`; redo writes `record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub prior: TransactionRecord,
    pub record: TransactionRecord,
}

/// Undo re-inserts the snapshotted group; redo deletes `id` and its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePayload {
    pub records: Vec<TransactionRecord>,
    pub id: String,
}

/// Undo restores the database from `backup`; redo re-imports `source_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReplacePayload {
    backup: PathBuf,
    pub source_text: String,
}

impl BulkReplacePayload {
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// The only permitted change to an appended operation: a redo produces a
    /// fresh snapshot of the pre-import state, and undo must restore that one.
    fn rebind_backup(&mut self, backup: PathBuf) {
        debug!(old = %self.backup.display(), new = %backup.display(), "rebinding import backup");
        self.backup = backup;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    AddRecord(AddPayload),
    UpdateRecord(UpdatePayload),
    DeleteRecord(DeletePayload),
    BulkReplace(BulkReplacePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub timestamp: DateTime<Local>,
    pub change: Change,
}

impl Operation {
    /// Build the undo/redo data for `mutation` from the store's current state.
    /// Must run before the mutation is applied.
    pub fn capture(store: &RecordStore, mutation: Mutation) -> Result<Self> {
        let change = match mutation {
            Mutation::Add(record) => Change::AddRecord(AddPayload {
                id: record.id.clone(),
                record,
            }),
            Mutation::Update(record) => {
                let prior = store
                    .get_by_id(&record.id)?
                    .ok_or_else(|| LedgerError::RecordNotFound(record.id.clone()))?;
                Change::UpdateRecord(UpdatePayload { prior, record })
            }
            Mutation::Delete(id) => {
                let records = store.get_self_and_children(&id)?;
                if records.is_empty() {
                    return Err(LedgerError::RecordNotFound(id));
                }
                Change::DeleteRecord(DeletePayload { records, id })
            }
            Mutation::BulkReplace {
                backup,
                source_text,
            } => Change::BulkReplace(BulkReplacePayload {
                backup,
                source_text,
            }),
        };
        Ok(Self {
            timestamp: Local::now(),
            change,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self.change {
            Change::AddRecord(_) => "AddRecord",
            Change::UpdateRecord(_) => "UpdateRecord",
            Change::DeleteRecord(_) => "DeleteRecord",
            Change::BulkReplace(_) => "BulkReplace",
        }
    }

    pub fn description(&self) -> String {
        match &self.change {
            Change::AddRecord(_) => "finalize 1 transaction".to_string(),
            Change::UpdateRecord(_) => "update 1 transaction".to_string(),
            Change::DeleteRecord(p) => format!("delete {} transactions", p.records.len()),
            Change::BulkReplace(_) => "load from csv".to_string(),
        }
    }

    fn apply_inverse(&self, store: &mut RecordStore) -> Result<()> {
        match &self.change {
            Change::AddRecord(p) => {
                store.delete_by_id(&p.id)?;
            }
            Change::UpdateRecord(p) => {
                if !store.update(&p.prior)? {
                    return Err(LedgerError::RecordNotFound(p.prior.id.clone()));
                }
            }
            Change::DeleteRecord(p) => store.insert_batch(&p.records)?,
            Change::BulkReplace(p) => store.restore_records_from(&p.backup)?,
        }
        Ok(())
    }

    fn apply_forward(&mut self, store: &mut RecordStore, backups_dir: &Path) -> Result<()> {
        match &mut self.change {
            Change::AddRecord(p) => store.insert(&p.record)?,
            Change::UpdateRecord(p) => {
                if !store.update(&p.record)? {
                    return Err(LedgerError::RecordNotFound(p.record.id.clone()));
                }
            }
            Change::DeleteRecord(p) => {
                store.delete_by_id(&p.id)?;
            }
            Change::BulkReplace(p) => {
                let backup = replace_store_from_text(store, &p.source_text, backups_dir)?;
                p.rebind_backup(backup);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HistoryLog {
    operations: Vec<Operation>,
    /// Number of operations currently applied; the cursor is `applied - 1`.
    applied: usize,
}

impl HistoryLog {
    /// Read the log stored alongside the records. A fresh database yields an
    /// empty log.
    pub fn load(store: &RecordStore) -> Result<Self> {
        let conn = store.conn();
        let mut stmt = conn.prepare("SELECT operation FROM history ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut operations = Vec::new();
        for json in rows {
            operations.push(serde_json::from_str::<Operation>(&json?)?);
        }
        let applied = match get_metadata(conn, APPLIED_KEY)? {
            Some(v) => v
                .parse::<usize>()
                .map_err(|e| LedgerError::Other(format!("Corrupt history cursor {v:?}: {e}")))?,
            None => 0,
        };
        if applied > operations.len() {
            return Err(LedgerError::Other(format!(
                "Corrupt history: cursor {} beyond {} operations",
                applied as isize - 1,
                operations.len()
            )));
        }
        Ok(Self {
            operations,
            applied,
        })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Index of the last applied operation, `None` when nothing is applied.
    pub fn cursor(&self) -> Option<usize> {
        self.applied.checked_sub(1)
    }

    /// Capture undo data for `mutation` and append it.
    pub fn record(&mut self, store: &mut RecordStore, mutation: Mutation) -> Result<()> {
        let op = Operation::capture(store, mutation)?;
        self.append(store, op)
    }

    /// Append an already captured operation, discarding any redo branch.
    /// Memory is only updated once the rows are written.
    pub fn append(&mut self, store: &mut RecordStore, op: Operation) -> Result<()> {
        let position = self.applied;
        let json = serde_json::to_string(&op)?;
        store.in_savepoint(|conn| {
            let dropped = conn.execute("DELETE FROM history WHERE position >= ?1", [position as i64])?;
            if dropped > 0 {
                debug!(dropped, "discarding redo branch");
            }
            conn.execute(
                "INSERT INTO history (position, operation) VALUES (?1, ?2)",
                params![position as i64, json],
            )?;
            save_applied(conn, position + 1)
        })?;
        self.operations.truncate(position);
        self.operations.push(op);
        self.applied = position + 1;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.operations.len()
    }

    pub fn describe_undo(&self) -> String {
        self.cursor()
            .map(|i| self.operations[i].description())
            .unwrap_or_default()
    }

    pub fn describe_redo(&self) -> String {
        self.operations
            .get(self.applied)
            .map(Operation::description)
            .unwrap_or_default()
    }

    /// Reverse the last applied operation. On failure the cursor stays put.
    /// The store change and the cursor write are only atomic when the caller
    /// holds a transaction (see `RecordStore::atomically`).
    pub fn undo(&mut self, store: &mut RecordStore) -> Result<()> {
        let Some(idx) = self.cursor() else {
            return Err(LedgerError::NothingToUndo);
        };
        let op = &self.operations[idx];
        op.apply_inverse(store)?;
        save_applied(store.conn(), idx)?;
        info!(kind = op.kind(), index = idx, "undid operation");
        self.applied = idx;
        Ok(())
    }

    /// Re-apply the next operation. Returns `Ok(false)` when there is nothing
    /// to redo; on failure the cursor stays put and the error is returned.
    pub fn redo(&mut self, store: &mut RecordStore, backups_dir: &Path) -> Result<bool> {
        let idx = self.applied;
        let Some(op) = self.operations.get(idx) else {
            return Ok(false);
        };
        let mut op = op.clone();
        op.apply_forward(store, backups_dir)?;
        let json = serde_json::to_string(&op)?;
        store.in_savepoint(|conn| {
            conn.execute(
                "UPDATE history SET operation = ?1 WHERE position = ?2",
                params![json, idx as i64],
            )?;
            save_applied(conn, idx + 1)
        })?;
        info!(kind = op.kind(), index = idx, "redid operation");
        self.operations[idx] = op;
        self.applied = idx + 1;
        Ok(true)
    }

    /// Backups that an undo or redo may still need.
    pub fn referenced_backups(&self) -> Vec<&Path> {
        self.operations
            .iter()
            .filter_map(|op| match &op.change {
                Change::BulkReplace(p) => Some(p.backup()),
                _ => None,
            })
            .collect()
    }
}

fn save_applied(conn: &Connection, applied: usize) -> Result<()> {
    set_metadata(conn, APPLIED_KEY, &applied.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::store::tests::{record, test_store};

    /// Capture, apply, then append, the way the ledger sequences a change.
    fn add(log: &mut HistoryLog, store: &mut RecordStore, tx: TransactionRecord) {
        let op = Operation::capture(store, Mutation::Add(tx.clone())).unwrap();
        store.insert(&tx).unwrap();
        log.append(store, op).unwrap();
    }

    fn ids(store: &RecordStore) -> Vec<String> {
        store.get_all().unwrap().into_iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_empty_log() {
        let (dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        assert_eq!(log.cursor(), None);
        assert!(!log.can_undo());
        assert!(!log.can_redo());
        assert_eq!(log.describe_undo(), "");
        assert_eq!(log.describe_redo(), "");
        assert!(matches!(log.undo(&mut store), Err(LedgerError::NothingToUndo)));
        assert!(!log.redo(&mut store, dir.path()).unwrap());
    }

    #[test]
    fn test_undo_redo_add() {
        let (dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        add(&mut log, &mut store, record("tx1", "2025-01-03"));
        assert_eq!(log.cursor(), Some(0));
        assert_eq!(log.describe_undo(), "finalize 1 transaction");

        log.undo(&mut store).unwrap();
        assert!(ids(&store).is_empty());
        assert!(log.can_redo());
        assert_eq!(log.describe_redo(), "finalize 1 transaction");

        assert!(log.redo(&mut store, dir.path()).unwrap());
        assert_eq!(ids(&store), vec!["tx1"]);
        assert!(!log.can_redo());
    }

    #[test]
    fn test_append_truncates_redo_branch() {
        let (_dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        add(&mut log, &mut store, record("a", "2025-01-01"));
        add(&mut log, &mut store, record("b", "2025-01-02"));
        add(&mut log, &mut store, record("c", "2025-01-03"));
        log.undo(&mut store).unwrap();
        log.undo(&mut store).unwrap();
        assert_eq!(log.cursor(), Some(0));
        assert!(log.can_redo());

        add(&mut log, &mut store, record("d", "2025-01-04"));
        assert!(!log.can_redo());
        assert_eq!(log.len(), 2);
        assert_eq!(log.cursor(), Some(1));
        assert_eq!(ids(&store), vec!["a", "d"]);
    }

    #[test]
    fn test_capture_update_requires_existing_record() {
        let (_dir, store) = test_store();
        let err = Operation::capture(&store, Mutation::Update(record("ghost", "2025-01-01"))).unwrap_err();
        assert!(matches!(err, LedgerError::RecordNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_capture_delete_snapshots_group() {
        let (_dir, mut store) = test_store();
        store.insert(&record("p", "2025-01-01")).unwrap();
        store.insert(&record("c", "2025-01-01").child_of("p")).unwrap();
        let op = Operation::capture(&store, Mutation::Delete("p".to_string())).unwrap();
        assert_eq!(op.description(), "delete 2 transactions");
        assert_eq!(op.kind(), "DeleteRecord");

        let err = Operation::capture(&store, Mutation::Delete("none".to_string())).unwrap_err();
        assert!(matches!(err, LedgerError::RecordNotFound(_)));
    }

    #[test]
    fn test_payload_is_a_snapshot() {
        let (_dir, mut store) = test_store();
        store.insert(&record("tx1", "2025-01-01")).unwrap();
        let mut changed = record("tx1", "2025-01-01");
        changed.note = Some("new".to_string());
        let op = Operation::capture(&store, Mutation::Update(changed.clone())).unwrap();
        store.update(&changed).unwrap();
        match &op.change {
            Change::UpdateRecord(p) => {
                assert_eq!(p.prior.note, None);
                assert_eq!(p.record.note.as_deref(), Some("new"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failed_undo_keeps_cursor() {
        let (dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        let group = vec![record("p", "2025-01-01")];
        store.insert_batch(&group).unwrap();
        let op = Operation::capture(&store, Mutation::Delete("p".to_string())).unwrap();
        store.delete_by_id("p").unwrap();
        log.append(&mut store, op).unwrap();

        // someone re-created the id behind the log's back
        store.insert(&record("p", "2030-01-01")).unwrap();
        assert!(matches!(log.undo(&mut store), Err(LedgerError::DuplicateId(_))));
        assert_eq!(log.cursor(), Some(0));

        store.delete_by_id("p").unwrap();
        log.undo(&mut store).unwrap();
        assert_eq!(log.cursor(), None);
        assert_eq!(store.get_all().unwrap(), group);
        assert!(log.redo(&mut store, dir.path()).unwrap());
        assert!(ids(&store).is_empty());
    }

    #[test]
    fn test_failed_redo_keeps_cursor_and_reports() {
        let (dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        add(&mut log, &mut store, record("tx1", "2025-01-01"));
        log.undo(&mut store).unwrap();
        store.insert(&record("tx1", "2030-01-01")).unwrap();

        let err = log.redo(&mut store, dir.path()).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateId(_)));
        assert_eq!(log.cursor(), None);
        assert!(log.can_redo());
    }

    #[test]
    fn test_bulk_replace_redo_rebinds_backup() {
        let (dir, mut store) = test_store();
        let backups = dir.path().join("backups");
        let mut log = HistoryLog::default();
        store.insert(&record("old", "2024-12-31")).unwrap();

        let text = encode(&[record("new", "2025-01-01")]).unwrap();
        let backup = replace_store_from_text(&mut store, &text, &backups).unwrap();
        log.record(
            &mut store,
            Mutation::BulkReplace {
                backup: backup.clone(),
                source_text: text,
            },
        )
        .unwrap();
        assert_eq!(log.describe_undo(), "load from csv");
        assert_eq!(log.referenced_backups(), vec![backup.as_path()]);

        log.undo(&mut store).unwrap();
        assert_eq!(ids(&store), vec!["old"]);
        assert!(log.redo(&mut store, &backups).unwrap());
        assert_eq!(ids(&store), vec!["new"]);

        let rebound = log.referenced_backups()[0].to_path_buf();
        assert_ne!(rebound, backup);
        assert!(rebound.exists());

        log.undo(&mut store).unwrap();
        assert_eq!(ids(&store), vec!["old"]);
    }

    #[test]
    fn test_log_reloads_from_store() {
        let (_dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        add(&mut log, &mut store, record("a", "2025-01-01"));
        add(&mut log, &mut store, record("b", "2025-01-02"));
        log.undo(&mut store).unwrap();

        let loaded = HistoryLog::load(&store).unwrap();
        assert_eq!(loaded, log);
        assert_eq!(loaded.cursor(), Some(0));
        assert_eq!(loaded.describe_redo(), "finalize 1 transaction");
    }

    #[test]
    fn test_truncated_branch_is_gone_after_reload() {
        let (_dir, mut store) = test_store();
        let mut log = HistoryLog::default();
        add(&mut log, &mut store, record("a", "2025-01-01"));
        add(&mut log, &mut store, record("b", "2025-01-02"));
        add(&mut log, &mut store, record("c", "2025-01-03"));
        log.undo(&mut store).unwrap();
        log.undo(&mut store).unwrap();
        add(&mut log, &mut store, record("d", "2025-01-04"));

        let loaded = HistoryLog::load(&store).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.can_redo());
        assert_eq!(loaded, log);
    }

    #[test]
    fn test_load_fresh_store_is_empty() {
        let (_dir, store) = test_store();
        let log = HistoryLog::load(&store).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
    }

    #[test]
    fn test_load_rejects_cursor_past_end() {
        let (_dir, store) = test_store();
        set_metadata(store.conn(), APPLIED_KEY, "2").unwrap();
        assert!(HistoryLog::load(&store).is_err());
    }
}
