use std::path::{Path, PathBuf};

use tracing::info;

use crate::codec::{encode, replace_store_from_text};
use crate::db::DB_FILE;
use crate::error::{LedgerError, Result};
use crate::history::{Change, HistoryLog, Mutation, Operation};
use crate::models::TransactionRecord;
use crate::store::RecordStore;

pub const BACKUPS_DIR: &str = "backups";
pub const EXPORTS_DIR: &str = "exports";

/// State handed back after an undo or redo.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub undo: String,
    pub redo: String,
    pub table: Vec<TransactionRecord>,
}

/// The record store and its history, driven together.
///
/// Every mutation runs inside one write transaction: the log is reloaded,
/// undo data is captured from the store, the change is applied, and the
/// operation is appended. The records and the log commit together, and a
/// mutation that fails leaves both untouched. Other handles on the same data
/// directory wait for the transaction instead of working from a stale log.
pub struct Ledger {
    store: RecordStore,
    history: HistoryLog,
    data_dir: PathBuf,
}

impl Ledger {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let store = RecordStore::open(&data_dir.join(DB_FILE))?;
        let history = HistoryLog::load(&store)?;
        Ok(Self {
            store,
            history,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUPS_DIR)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Run `f` against the latest log in one write transaction, keeping the
    /// log it leaves behind only if everything committed.
    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut RecordStore, &mut HistoryLog) -> Result<T>,
    ) -> Result<T> {
        let outcome = self.store.atomically(|store| {
            let mut history = HistoryLog::load(store)?;
            let value = f(store, &mut history)?;
            Ok((value, history))
        });
        match outcome {
            Ok((value, history)) => {
                self.history = history;
                Ok(value)
            }
            Err(e) => {
                if let Ok(history) = HistoryLog::load(&self.store) {
                    self.history = history;
                }
                Err(e)
            }
        }
    }

    /// Seed an empty ledger with `defaults`; returns the resulting record set.
    pub fn initialize_if_empty(&mut self, defaults: &[TransactionRecord]) -> Result<Vec<TransactionRecord>> {
        self.store.atomically(|store| store.initialize_if_empty(defaults))
    }

    pub fn add_record(&mut self, record: TransactionRecord) -> Result<TransactionRecord> {
        self.transact(|store, history| {
            let op = Operation::capture(store, Mutation::Add(record.clone()))?;
            store.insert(&record)?;
            commit(store, history, op)?;
            Ok(record)
        })
    }

    pub fn update_record(&mut self, record: TransactionRecord) -> Result<TransactionRecord> {
        self.transact(|store, history| {
            let op = Operation::capture(store, Mutation::Update(record.clone()))?;
            if !store.update(&record)? {
                return Err(LedgerError::RecordNotFound(record.id));
            }
            commit(store, history, op)?;
            Ok(record)
        })
    }

    /// Delete a record and its direct children. Returns the removed group.
    pub fn delete_record(&mut self, id: &str) -> Result<Vec<TransactionRecord>> {
        self.transact(|store, history| {
            let op = Operation::capture(store, Mutation::Delete(id.to_string()))?;
            let removed = match &op.change {
                Change::DeleteRecord(p) => p.records.clone(),
                _ => Vec::new(),
            };
            store.delete_by_id(id)?;
            commit(store, history, op)?;
            Ok(removed)
        })
    }

    pub fn get_record(&self, id: &str) -> Result<TransactionRecord> {
        self.store
            .get_by_id(id)?
            .ok_or_else(|| LedgerError::RecordNotFound(id.to_string()))
    }

    pub fn get_all_records(&self) -> Result<Vec<TransactionRecord>> {
        self.store.get_all()
    }

    /// Replace the whole ledger from CSV text and record it for undo.
    /// Returns the backup of the previous state.
    pub fn ingest_bulk_text(&mut self, text: &str) -> Result<PathBuf> {
        let backups = self.backups_dir();
        self.transact(|store, history| {
            let backup = replace_store_from_text(store, text, &backups)?;
            history.record(
                store,
                Mutation::BulkReplace {
                    backup: backup.clone(),
                    source_text: text.to_string(),
                },
            )?;
            info!(backup = %backup.display(), "recorded bulk replace");
            Ok(backup)
        })
    }

    pub fn export_bulk_text(&self) -> Result<String> {
        encode(&self.store.get_all()?)
    }

    /// Copy the live database to `dest` without touching the history.
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        self.store.snapshot_to(dest)
    }

    pub fn undo_redo_labels(&self) -> (String, String) {
        (self.history.describe_undo(), self.history.describe_redo())
    }

    fn view(&self) -> Result<HistoryView> {
        let (undo, redo) = self.undo_redo_labels();
        Ok(HistoryView {
            undo,
            redo,
            table: self.store.get_all()?,
        })
    }

    pub fn undo(&mut self) -> Result<HistoryView> {
        self.transact(|store, history| history.undo(store))?;
        self.view()
    }

    /// Redo the next operation. With nothing to redo the view is returned unchanged.
    pub fn redo(&mut self) -> Result<HistoryView> {
        let backups = self.backups_dir();
        self.transact(|store, history| history.redo(store, &backups))?;
        self.view()
    }
}

fn commit(store: &mut RecordStore, history: &mut HistoryLog, op: Operation) -> Result<()> {
    let kind = op.kind();
    history.append(store, op)?;
    info!(kind, "recorded operation");
    Ok(())
}
