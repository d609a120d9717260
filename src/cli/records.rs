use comfy_table::{Cell, Table};

use crate::cli::RecordFields;
use crate::error::{LedgerError, Result};
use crate::fmt::{amount, fee, usd};
use crate::ledger::Ledger;
use crate::models::{new_tx_id, RowType, TransactionRecord};
use crate::settings::get_data_dir;

const CLEARABLE: &[&str] = &[
    "parentId",
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

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Overlay the given fields onto `tx`, leaving unset ones alone.
fn apply_fields(tx: &mut TransactionRecord, fields: RecordFields) {
    if let Some(parent) = fields.parent.and_then(non_empty) {
        tx.parent_id = Some(parent);
        tx.is_sub_row = true;
    }
    if fields.in_amount.is_some() {
        tx.in_amount = fields.in_amount;
    }
    if let Some(c) = fields.in_currency {
        tx.in_currency = non_empty(c);
    }
    if fields.out_amount.is_some() {
        tx.out_amount = fields.out_amount;
    }
    if let Some(c) = fields.out_currency {
        tx.out_currency = non_empty(c);
    }
    if fields.fee.is_some() {
        tx.fee_amount = fields.fee;
    }
    if let Some(c) = fields.fee_currency {
        tx.fee_currency = non_empty(c);
    }
    if fields.usd_value.is_some() {
        tx.usd_value = fields.usd_value;
    }
    if let Some(n) = fields.network {
        tx.network = n.trim().to_string();
    }
    if !fields.tags.is_empty() {
        tx.tags = fields.tags.into_iter().filter_map(non_empty).collect();
    }
    if let Some(n) = fields.note {
        tx.note = non_empty(n);
    }
}

fn clear_field(tx: &mut TransactionRecord, field: &str) -> Result<()> {
    match field {
        "parentId" => {
            tx.parent_id = None;
            tx.is_sub_row = false;
        }
        "inAmount" => tx.in_amount = None,
        "inCurrency" => tx.in_currency = None,
        "outAmount" => tx.out_amount = None,
        "outCurrency" => tx.out_currency = None,
        "feeAmount" => tx.fee_amount = None,
        "feeCurrency" => tx.fee_currency = None,
        "usdValue" => tx.usd_value = None,
        "network" => tx.network.clear(),
        "tags" => tx.tags.clear(),
        "note" => tx.note = None,
        other => {
            return Err(LedgerError::Other(format!(
                "Cannot clear '{other}' (expected one of: {})",
                CLEARABLE.join(", ")
            )))
        }
    }
    Ok(())
}

pub fn add(id: Option<String>, date: String, row_type: RowType, fields: RecordFields) -> Result<()> {
    let mut ledger = Ledger::open(&get_data_dir())?;
    let id = id.and_then(non_empty).unwrap_or_else(new_tx_id);
    let mut tx = TransactionRecord::new(id, date, row_type);
    apply_fields(&mut tx, fields);
    let tx = ledger.add_record(tx)?;
    println!("Added transaction: {}", tx.id);
    Ok(())
}

pub fn update(
    id: &str,
    date: Option<String>,
    row_type: Option<RowType>,
    fields: RecordFields,
    clear: &[String],
) -> Result<()> {
    let mut ledger = Ledger::open(&get_data_dir())?;
    let mut tx = ledger.get_record(id)?;
    for field in clear {
        clear_field(&mut tx, field)?;
    }
    if let Some(d) = date {
        tx.date = d;
    }
    if let Some(t) = row_type {
        tx.row_type = t;
    }
    apply_fields(&mut tx, fields);
    let tx = ledger.update_record(tx)?;
    println!("Updated transaction: {}", tx.id);
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    let mut ledger = Ledger::open(&get_data_dir())?;
    let removed = ledger.delete_record(id)?;
    let noun = if removed.len() == 1 { "transaction" } else { "transactions" };
    println!("Deleted {} {noun}", removed.len());
    for tx in &removed {
        println!("  {}", tx.id);
    }
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let ledger = Ledger::open(&get_data_dir())?;
    let tx = ledger.get_record(id)?;

    let mut table = Table::new();
    let rows: Vec<(&str, String)> = vec![
        ("ID", tx.id.clone()),
        ("Parent", tx.parent_id.clone().unwrap_or_default()),
        ("Date", tx.date.clone()),
        ("Type", format!("{} ({})", tx.row_type.name(), tx.row_type.label())),
        ("In", amount(tx.in_amount, tx.in_currency.as_deref())),
        ("Out", amount(tx.out_amount, tx.out_currency.as_deref())),
        ("Fee", fee(tx.fee_amount, tx.fee_currency.as_deref())),
        ("USD", usd(tx.usd_value)),
        ("Network", tx.network.clone()),
        ("Tags", tx.tags.join(", ")),
        ("Note", tx.note.clone().unwrap_or_default()),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}

pub(crate) fn records_table(records: &[TransactionRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Type", "In", "Out", "Fee", "USD", "Network", "Tags"]);
    for tx in records {
        let id = if tx.is_sub_row {
            format!("  └ {}", tx.id)
        } else {
            tx.id.clone()
        };
        table.add_row(vec![
            Cell::new(id),
            Cell::new(&tx.date),
            Cell::new(tx.row_type.name()),
            Cell::new(amount(tx.in_amount, tx.in_currency.as_deref())),
            Cell::new(amount(tx.out_amount, tx.out_currency.as_deref())),
            Cell::new(fee(tx.fee_amount, tx.fee_currency.as_deref())),
            Cell::new(usd(tx.usd_value)),
            Cell::new(&tx.network),
            Cell::new(tx.tags.join(", ")),
        ]);
    }
    table
}

pub fn list() -> Result<()> {
    let ledger = Ledger::open(&get_data_dir())?;
    let records = ledger.get_all_records()?;
    if records.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    println!("Transactions ({})\n{}", records.len(), records_table(&records));
    Ok(())
}
