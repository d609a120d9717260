use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::StringRecord;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::db::FIELDS;
use crate::error::{LedgerError, Result};
use crate::models::{Fee, RowType, TransactionRecord};
use crate::store::RecordStore;

pub const BACKUP_PREFIX: &str = "transactions_backup_";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn opt_to_cell<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn record_to_row(tx: &TransactionRecord) -> [String; 15] {
    [
        tx.id.clone(),
        tx.is_sub_row.to_string(),
        opt_to_cell(&tx.parent_id),
        tx.date.clone(),
        tx.row_type.name().to_string(),
        opt_to_cell(&tx.in_amount),
        opt_to_cell(&tx.in_currency),
        opt_to_cell(&tx.out_amount),
        opt_to_cell(&tx.out_currency),
        opt_to_cell(&tx.fee_amount),
        opt_to_cell(&tx.fee_currency),
        opt_to_cell(&tx.usd_value),
        tx.network.clone(),
        tx.tags.join(", "),
        opt_to_cell(&tx.note),
    ]
}

/// Render records as CSV with the canonical header, one row per record.
pub fn encode(records: &[TransactionRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(FIELDS)?;
    for tx in records {
        wtr.write_record(record_to_row(tx))?;
    }
    let bytes = wtr.into_inner().map_err(|e| LedgerError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| LedgerError::Other(e.to_string()))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Column positions by header name, so input column order does not matter.
struct HeaderIndex(HashMap<String, usize>);

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let map = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        Self(map)
    }

    /// Missing columns read as empty cells.
    fn cell<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.0
            .get(column)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }
}

fn opt_string(cell: &str) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn opt_decimal(cell: &str, row: usize, column: &'static str) -> Result<Option<Decimal>> {
    let raw = cell.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_decimal(raw).map(Some).ok_or_else(|| LedgerError::MalformedField {
        row,
        column,
        value: cell.to_string(),
    })
}

fn opt_fee(cell: &str, row: usize) -> Result<Option<Fee>> {
    let raw = cell.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(Some(Fee::Auto));
    }
    parse_decimal(raw)
        .map(|d| Some(Fee::Amount(d)))
        .ok_or_else(|| LedgerError::MalformedField {
            row,
            column: "feeAmount",
            value: cell.to_string(),
        })
}

fn parse_tags(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn row_to_record(idx: &HeaderIndex, record: &StringRecord, row: usize) -> Result<TransactionRecord> {
    let id = idx.cell(record, "id").trim();
    if id.is_empty() {
        return Err(LedgerError::MalformedField {
            row,
            column: "id",
            value: String::new(),
        });
    }
    let row_type_cell = idx.cell(record, "rowType");
    let row_type = RowType::from_name(row_type_cell).ok_or_else(|| LedgerError::UnknownEnumValue {
        column: "rowType",
        value: row_type_cell.to_string(),
    })?;

    Ok(TransactionRecord {
        id: id.to_string(),
        parent_id: opt_string(idx.cell(record, "parentId")),
        is_sub_row: idx.cell(record, "isSubRow").trim().eq_ignore_ascii_case("true"),
        date: idx.cell(record, "date").to_string(),
        row_type,
        in_amount: opt_decimal(idx.cell(record, "inAmount"), row, "inAmount")?,
        in_currency: opt_string(idx.cell(record, "inCurrency")),
        out_amount: opt_decimal(idx.cell(record, "outAmount"), row, "outAmount")?,
        out_currency: opt_string(idx.cell(record, "outCurrency")),
        fee_amount: opt_fee(idx.cell(record, "feeAmount"), row)?,
        fee_currency: opt_string(idx.cell(record, "feeCurrency")),
        usd_value: opt_decimal(idx.cell(record, "usdValue"), row, "usdValue")?,
        network: idx.cell(record, "network").to_string(),
        tags: parse_tags(idx.cell(record, "tags")),
        note: opt_string(idx.cell(record, "note")),
    })
}

/// Parse CSV text into records. Row numbers in errors are 1-based data rows.
pub fn decode(text: &str) -> Result<Vec<TransactionRecord>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = csv::ReaderBuilder::new().from_reader(text.as_bytes());
    let idx = HeaderIndex::new(rdr.headers()?);

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        records.push(row_to_record(&idx, &record, i + 1)?);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Snapshot-and-swap
// ---------------------------------------------------------------------------

/// A backup path under `dir` that does not exist yet.
pub fn unique_backup_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let first = dir.join(format!("{BACKUP_PREFIX}{stamp}.db"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{BACKUP_PREFIX}{stamp}_{n}.db")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Replace every record in `store` with the rows in `text`.
///
/// The current records are snapshotted into `backups_dir` before anything is
/// touched. If decoding or the replace fails, the snapshot is restored and
/// `ImportFailed` is returned, so the store is left exactly as it was.
/// On success the snapshot path is returned so the caller can undo later.
pub fn replace_store_from_text(
    store: &mut RecordStore,
    text: &str,
    backups_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(backups_dir)?;
    let backup = unique_backup_path(backups_dir);
    store.snapshot_records_to(&backup)?;
    let count = swap_in_text(store, text, &backup)?;
    info!(count, backup = %backup.display(), "imported transactions from csv");
    Ok(backup)
}

/// Decode `text` and swap it in, falling back to the records saved at `backup`.
fn swap_in_text(store: &mut RecordStore, text: &str, backup: &Path) -> Result<usize> {
    let outcome = decode(text).and_then(|records| {
        store.bulk_replace(&records)?;
        Ok(records.len())
    });
    outcome.or_else(|cause| {
        warn!(error = %cause, "csv import failed, restoring backup");
        if let Err(restore) = store.restore_records_from(backup) {
            error!(error = %restore, backup = %backup.display(), "failed to restore backup");
            return Err(LedgerError::RestoreFailed {
                backup: backup.to_path_buf(),
                cause: Box::new(cause),
                restore: Box::new(restore),
            });
        }
        Err(LedgerError::import_failed(cause))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{record, test_store};

    fn sample_records() -> Vec<TransactionRecord> {
        let mut auto_fee = record("tx1", "2025-01-03");
        auto_fee.fee_amount = Some(Fee::Auto);
        auto_fee.tags = vec!["a".to_string(), "b".to_string()];
        auto_fee.note = Some("with, comma \"quoted\"".to_string());

        let mut no_fee = record("tx2", "2025-01-04").child_of("tx1");
        no_fee.row_type = RowType::SubExtraOut;
        no_fee.fee_amount = None;
        no_fee.tags = Vec::new();
        no_fee.note = None;
        no_fee.in_amount = None;

        let mut amount_fee = record("tx3", "2025-01-05");
        amount_fee.fee_amount = Some(Fee::Amount(Decimal::new(-15, 3)));
        amount_fee.usd_value = Some(Decimal::new(1_699_081, 2));

        vec![auto_fee, no_fee, amount_fee]
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let records = sample_records();
        let text = encode(&records).unwrap();
        assert_eq!(decode(&text).unwrap(), records);
    }

    #[test]
    fn test_encode_header_and_cells() {
        let text = encode(&sample_records()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), FIELDS.join(","));
        let first = lines.next().unwrap();
        assert!(first.starts_with("tx1,false,,2025-01-03,TRADE,123.45,USDC,"), "{first}");
        assert!(first.contains(",auto,"), "{first}");
        assert!(first.contains("\"a, b\""), "{first}");
        let second = lines.next().unwrap();
        assert!(second.starts_with("tx2,true,tx1,2025-01-04,subEXTRAOUT,,"), "{second}");
    }

    #[test]
    fn test_decode_coercions() {
        let text = r#"id,isSubRow,parentId,date,rowType,inAmount,inCurrency,outAmount,outCurrency,feeAmount,feeCurrency,usdValue,network,tags,note
t-1,True,p-1,2025-01-03,REWARD,1e-3,ETH,,,AUTO,,,Base," x ,  y",
"#;
        let recs = decode(text).unwrap();
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert!(r.is_sub_row);
        assert_eq!(r.parent_id.as_deref(), Some("p-1"));
        assert_eq!(r.row_type, RowType::Reward);
        assert_eq!(r.in_amount, Some(Decimal::new(1, 3)));
        assert_eq!(r.out_amount, None);
        assert_eq!(r.fee_amount, Some(Fee::Auto));
        assert_eq!(r.network, "Base");
        assert_eq!(r.tags, vec!["x", "y"]);
        assert_eq!(r.note, None);
    }

    #[test]
    fn test_decode_ignores_column_order_and_extra_columns() {
        let text = "\
note,rowType,id,extra
hi,LOSS,t-9,whatever
";
        let recs = decode(text).unwrap();
        assert_eq!(recs[0].id, "t-9");
        assert_eq!(recs[0].row_type, RowType::Loss);
        assert_eq!(recs[0].note.as_deref(), Some("hi"));
        assert!(!recs[0].is_sub_row);
        assert!(recs[0].tags.is_empty());
    }

    #[test]
    fn test_decode_missing_row_type_column() {
        let text = "id,date\nt-1,2025-01-03\n";
        let err = decode(text).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownEnumValue { column: "rowType", .. }));
    }

    #[test]
    fn test_decode_unknown_row_type_is_exact() {
        let text = "id,rowType\nt-1,trade\n";
        let err = decode(text).unwrap_err();
        match err {
            LedgerError::UnknownEnumValue { value, .. } => assert_eq!(value, "trade"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_amount_reports_row() {
        let text = "id,rowType,outAmount\nt-1,TRADE,5\nt-2,TRADE,five\n";
        let err = decode(text).unwrap_err();
        match err {
            LedgerError::MalformedField { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "outAmount");
                assert_eq!(value, "five");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_requires_id() {
        let text = "id,rowType\n,TRADE\n";
        assert!(matches!(
            decode(text).unwrap_err(),
            LedgerError::MalformedField { column: "id", .. }
        ));
    }

    #[test]
    fn test_decode_strips_bom() {
        let text = "\u{feff}id,rowType\nt-1,INIT\n";
        assert_eq!(decode(text).unwrap()[0].row_type, RowType::Init);
    }

    #[test]
    fn test_replace_store_from_text_success_keeps_backup() {
        let (dir, mut store) = test_store();
        store.insert(&record("old", "2024-12-31")).unwrap();
        let text = encode(&sample_records()).unwrap();
        let backups = dir.path().join("backups");

        let backup = replace_store_from_text(&mut store, &text, &backups).unwrap();
        assert!(backup.exists());
        assert!(backup.starts_with(&backups));
        assert_eq!(store.get_all().unwrap(), sample_records());

        store.restore_records_from(&backup).unwrap();
        let ids: Vec<String> = store.get_all().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[test]
    fn test_replace_store_from_text_restores_on_decode_failure() {
        let (dir, mut store) = test_store();
        store.insert(&record("old", "2024-12-31")).unwrap();
        let before = store.get_all().unwrap();

        let err = replace_store_from_text(&mut store, "id,rowType\nt-1,SWAP\n", dir.path()).unwrap_err();
        match err {
            LedgerError::ImportFailed { source } => assert_eq!(source.kind(), "UnknownEnumValue"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.get_all().unwrap(), before);
    }

    #[test]
    fn test_replace_store_from_text_restores_on_replace_failure() {
        let (dir, mut store) = test_store();
        store.insert(&record("old", "2024-12-31")).unwrap();
        store.insert(&record("kid", "2024-12-31").child_of("old")).unwrap();
        let before = store.get_all().unwrap();

        // the second row collides mid-replace, after the table was cleared
        let text = "id,rowType\nn-1,TRADE\nn-1,LOSS\n";
        let err = replace_store_from_text(&mut store, text, dir.path()).unwrap_err();
        match err {
            LedgerError::ImportFailed { source } => assert_eq!(source.kind(), "DuplicateId"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.get_all().unwrap(), before);
    }

    #[test]
    fn test_swap_reports_restore_failure_when_backup_is_gone() {
        let (dir, mut store) = test_store();
        store.insert(&record("old", "2024-12-31")).unwrap();
        let before = store.get_all().unwrap();
        let backup = dir.path().join("gone.db");
        store.snapshot_records_to(&backup).unwrap();
        std::fs::remove_file(&backup).unwrap();

        let text = "id,rowType\nn-1,TRADE\nn-1,LOSS\n";
        let err = swap_in_text(&mut store, text, &backup).unwrap_err();
        match &err {
            LedgerError::RestoreFailed { backup: path, cause, .. } => {
                assert_eq!(path, &backup);
                assert_eq!(cause.kind(), "DuplicateId");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.kind(), "RestoreFailed");
        // the failed replace never committed, so the records are still there
        assert_eq!(store.get_all().unwrap(), before);
    }

    #[test]
    fn test_unique_backup_path_avoids_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_backup_path(dir.path());
        std::fs::write(&first, b"x").unwrap();
        let second = unique_backup_path(dir.path());
        assert_ne!(first, second);
        let name = second.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(BACKUP_PREFIX), "{name}");
        assert!(name.ends_with(".db"), "{name}");
    }
}
