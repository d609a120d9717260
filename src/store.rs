use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::db::{get_connection, init_db};
use crate::error::{LedgerError, Result};
use crate::models::{Fee, RowType, TransactionRecord};

const SELECT_ALL: &str = "SELECT id, isSubRow, parentId, date, rowType, inAmount, inCurrency, \
     outAmount, outCurrency, feeAmount, feeCurrency, usdValue, network, tags, note \
     FROM transactions";

const INSERT: &str = "INSERT INTO transactions (id, isSubRow, parentId, date, rowType, inAmount, \
     inCurrency, outAmount, outCurrency, feeAmount, feeCurrency, usdValue, network, tags, note) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 100;
const BACKUP_PAUSE: Duration = Duration::from_millis(10);

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn row_to_record(row: &Row) -> rusqlite::Result<TransactionRecord> {
    let row_type_name: String = row.get(4)?;
    let row_type = RowType::from_name(&row_type_name).ok_or_else(|| {
        conversion_error(
            4,
            LedgerError::UnknownEnumValue {
                column: "rowType",
                value: row_type_name.clone(),
            },
        )
    })?;
    let fee_raw: Option<String> = row.get(9)?;
    let fee_amount = fee_raw
        .map(|s| Fee::from_str(&s).map_err(|e| conversion_error(9, e)))
        .transpose()?;
    let tags_raw: String = row.get(13)?;
    let tags: Vec<String> = serde_json::from_str(&tags_raw).map_err(|e| conversion_error(13, e))?;

    Ok(TransactionRecord {
        id: row.get(0)?,
        is_sub_row: row.get(1)?,
        parent_id: row.get(2)?,
        date: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        row_type,
        in_amount: decimal_column(row, 5)?,
        in_currency: row.get(6)?,
        out_amount: decimal_column(row, 7)?,
        out_currency: row.get(8)?,
        fee_amount,
        fee_currency: row.get(10)?,
        usd_value: decimal_column(row, 11)?,
        network: row.get(12)?,
        tags,
        note: row.get(14)?,
    })
}

fn id_exists(conn: &Connection, id: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM transactions WHERE id = ?1")?;
    Ok(stmt.exists([id])?)
}

/// Insert one row, rejecting an id that is already present (including rows
/// inserted earlier in the same SQL transaction).
fn insert_row(conn: &Connection, tx: &TransactionRecord) -> Result<()> {
    if id_exists(conn, &tx.id)? {
        return Err(LedgerError::DuplicateId(tx.id.clone()));
    }
    let tags = serde_json::to_string(&tx.tags)?;
    conn.prepare_cached(INSERT)?.execute(rusqlite::params![
        tx.id,
        tx.is_sub_row,
        tx.parent_id,
        tx.date,
        tx.row_type.name(),
        tx.in_amount.map(|d| d.to_string()),
        tx.in_currency,
        tx.out_amount.map(|d| d.to_string()),
        tx.out_currency,
        tx.fee_amount.map(|f| f.to_string()),
        tx.fee_currency,
        tx.usd_value.map(|d| d.to_string()),
        tx.network,
        tags,
        tx.note,
    ])?;
    Ok(())
}

/// Durable keyed storage of transaction records backed by SQLite.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn insert(&mut self, tx: &TransactionRecord) -> Result<()> {
        if let Some(parent) = &tx.parent_id {
            if !id_exists(&self.conn, parent)? {
                warn!(id = %tx.id, parent = %parent, "inserting sub-row whose parent does not exist");
            }
        }
        insert_row(&self.conn, tx)?;
        debug!(id = %tx.id, "inserted transaction");
        Ok(())
    }

    /// Replace the row with the same id. Returns false when no row matched.
    pub fn update(&mut self, tx: &TransactionRecord) -> Result<bool> {
        let tags = serde_json::to_string(&tx.tags)?;
        let changed = self.conn.execute(
            "UPDATE transactions SET isSubRow = ?1, parentId = ?2, date = ?3, rowType = ?4, \
             inAmount = ?5, inCurrency = ?6, outAmount = ?7, outCurrency = ?8, feeAmount = ?9, \
             feeCurrency = ?10, usdValue = ?11, network = ?12, tags = ?13, note = ?14 \
             WHERE id = ?15",
            rusqlite::params![
                tx.is_sub_row,
                tx.parent_id,
                tx.date,
                tx.row_type.name(),
                tx.in_amount.map(|d| d.to_string()),
                tx.in_currency,
                tx.out_amount.map(|d| d.to_string()),
                tx.out_currency,
                tx.fee_amount.map(|f| f.to_string()),
                tx.fee_currency,
                tx.usd_value.map(|d| d.to_string()),
                tx.network,
                tags,
                tx.note,
                tx.id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete `id` and its direct children. Deleting a missing id is a no-op.
    /// Returns the number of rows removed.
    pub fn delete_by_id(&mut self, id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1 OR parentId = ?1", [id])?;
        debug!(id, removed, "deleted transaction group");
        Ok(removed)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!("{SELECT_ALL} WHERE id = ?1"))?;
        let mut rows = stmt.query_map([id], row_to_record)?;
        Ok(rows.next().transpose()?)
    }

    /// The record plus its direct children, parent first.
    pub fn get_self_and_children(&self, id: &str) -> Result<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_ALL} WHERE id = ?1 OR parentId = ?1 ORDER BY isSubRow, date, id"
        ))?;
        let rows = stmt
            .query_map([id], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_all(&self) -> Result<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!("{SELECT_ALL} ORDER BY date, id"))?;
        let rows = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert all records at once; nothing is written if any id collides.
    pub fn insert_batch(&mut self, txs: &[TransactionRecord]) -> Result<()> {
        self.in_savepoint(|conn| {
            for tx in txs {
                insert_row(conn, tx)?;
            }
            Ok(())
        })?;
        debug!(count = txs.len(), "inserted transaction batch");
        Ok(())
    }

    /// Discard every record and store `txs` instead, atomically.
    pub fn bulk_replace(&mut self, txs: &[TransactionRecord]) -> Result<()> {
        self.in_savepoint(|conn| {
            conn.execute("DELETE FROM transactions", [])?;
            for tx in txs {
                insert_row(conn, tx)?;
            }
            Ok(())
        })?;
        info!(count = txs.len(), "replaced all transactions");
        Ok(())
    }

    /// Run `f` in a savepoint: all of its writes land or none do. Nests inside
    /// `atomically`.
    pub(crate) fn in_savepoint<T>(&mut self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let sp = self.conn.savepoint()?;
        let value = f(&sp)?;
        sp.commit()?;
        Ok(value)
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction, committed only if it
    /// succeeds. The write lock is taken up front, so every ledger handle on
    /// the same file (in this process or another) runs its read-modify-write
    /// cycle alone.
    pub fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = f(self);
        match result {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %e, "rollback failed");
                }
                Err(err)
            }
        }
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Populate an empty store with `defaults`; otherwise return what is there.
    pub fn initialize_if_empty(
        &mut self,
        defaults: &[TransactionRecord],
    ) -> Result<Vec<TransactionRecord>> {
        if self.count()? == 0 {
            self.insert_batch(defaults)?;
            info!(count = defaults.len(), "created new ledger with default transactions");
            Ok(defaults.to_vec())
        } else {
            let existing = self.get_all()?;
            info!(count = existing.len(), "loaded transactions from db");
            Ok(existing)
        }
    }

    /// Copy the whole database to `dest` and flush it to disk.
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        {
            let mut dest_conn = Connection::open(dest)?;
            let backup = Backup::new(&self.conn, &mut dest_conn)?;
            backup.run_to_completion(BACKUP_PAGES_PER_STEP, BACKUP_PAUSE, None)?;
        }
        std::fs::File::open(dest)?.sync_all()?;
        debug!(path = %dest.display(), "wrote database snapshot");
        Ok(())
    }

    /// Save the current records into a new ledger database at `dest`.
    pub fn snapshot_records_to(&self, dest: &Path) -> Result<()> {
        let records = self.get_all()?;
        {
            let mut copy = RecordStore::open(dest)?;
            copy.insert_batch(&records)?;
        }
        std::fs::File::open(dest)?.sync_all()?;
        debug!(path = %dest.display(), count = records.len(), "wrote record snapshot");
        Ok(())
    }

    /// Replace every record with those saved in the snapshot at `src`.
    /// Only the records change; the history tables are left alone.
    pub fn restore_records_from(&mut self, src: &Path) -> Result<()> {
        if !src.exists() {
            return Err(LedgerError::Other(format!(
                "Backup {} does not exist",
                src.display()
            )));
        }
        let records = RecordStore::open(src)?.get_all()?;
        self.bulk_replace(&records)?;
        info!(path = %src.display(), "restored records from snapshot");
        Ok(())
    }
}
