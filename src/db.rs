use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Fee, RowType, TransactionRecord};

pub const DB_FILE: &str = "transactions.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    isSubRow INTEGER NOT NULL,
    parentId TEXT,
    date TEXT,
    rowType TEXT NOT NULL,
    inAmount TEXT,
    inCurrency TEXT,
    outAmount TEXT,
    outCurrency TEXT,
    feeAmount TEXT,
    feeCurrency TEXT,
    usdValue TEXT,
    network TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    note TEXT
);

CREATE INDEX IF NOT EXISTS idx_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_parent ON transactions(parentId);

CREATE TABLE IF NOT EXISTS history (
    position INTEGER PRIMARY KEY,
    operation TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Canonical field order shared by the table and the CSV header.
pub const FIELDS: &[&str] = &[
    "id",
    "isSubRow",
    "parentId",
    "date",
    "rowType",
    "inAmount",
    "inCurrency",
    "outAmount",
    "outCurrency",
    "feeAmount",
    "feeCurrency",
    "usdValue",
    "network",
    "tags",
    "note",
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    // concurrent ledgers wait for each other's write transactions
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
        .optional()?;
    Ok(value)
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

/// Records loaded into an empty ledger by `txledger init --demo`.
pub fn demo_records() -> Vec<TransactionRecord> {
    let mut first = TransactionRecord::new("t-1735862400000-demo01", "2025-01-03", RowType::Trade);
    first.in_amount = Some(Decimal::new(1_699_081, 2));
    first.in_currency = Some("USDC".to_string());
    first.out_amount = Some(Decimal::from(4000));
    first.out_currency = Some("VIRTUAL".to_string());
    first.fee_amount = Some(Fee::Amount(Decimal::ZERO));
    first.fee_currency = Some("ETH".to_string());
    first.usd_value = Some(Decimal::new(1_699_081, 2));
    first.network = "Ethereum".to_string();
    first.tags = vec!["test".to_string()];
    first.note = Some("test transaction".to_string());

    let mut second = TransactionRecord::new("t-1735948800000-demo02", "2025-01-04", RowType::Trade);
    second.in_amount = Some(Decimal::new(641_746, 2));
    second.in_currency = Some("AERO".to_string());
    second.out_amount = Some(Decimal::from(10_000));
    second.out_currency = Some("USDC".to_string());
    second.fee_amount = Some(Fee::Auto);
    second.fee_currency = Some("ETH".to_string());
    second.usd_value = Some(Decimal::new(641_746, 2));
    second.network = "Ethereum".to_string();
    second.tags = vec!["test".to_string()];

    let mut extra =
        TransactionRecord::new("t-1735948800001-demo03", "2025-01-04", RowType::SubExtraOut)
            .child_of(second.id.clone());
    extra.out_amount = Some(Decimal::new(25, 1));
    extra.out_currency = Some("USDC".to_string());
    extra.network = "Ethereum".to_string();
    extra.note = Some("bridge fee".to_string());

    vec![first, second, extra]
}
