pub mod backup;
pub mod cleanup;
pub mod export;
pub mod history;
pub mod import;
pub mod init;
pub mod records;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::models::{Fee, RowType};

pub(crate) fn parse_row_type(s: &str) -> std::result::Result<RowType, String> {
    RowType::from_name(s).ok_or_else(|| {
        let names: Vec<&str> = RowType::ALL.iter().map(|t| t.name()).collect();
        format!("unknown row type '{s}' (expected one of: {})", names.join(", "))
    })
}

#[derive(Parser)]
#[command(name = "txledger", version, about = "Transaction ledger with undo/redo history and CSV import/export.")]
pub struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the ledger database.
    Init {
        /// Path for ledger data (default: ~/Documents/txledger)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Seed an empty ledger with sample transactions
        #[arg(long)]
        demo: bool,
    },
    /// Add a transaction.
    Add {
        /// Transaction id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Transaction date, e.g. 2025-01-03
        #[arg(long)]
        date: String,
        /// Row type: TRADE, BRIDGEIN, subEXTRAOUT, ...
        #[arg(long = "type", value_parser = parse_row_type)]
        row_type: RowType,
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Update a transaction. Fields not given keep their value.
    Update {
        /// Transaction id
        id: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long = "type", value_parser = parse_row_type)]
        row_type: Option<RowType>,
        #[command(flatten)]
        fields: RecordFields,
        /// Reset a field to empty (repeatable), e.g. --clear note
        #[arg(long, value_name = "FIELD")]
        clear: Vec<String>,
    },
    /// Delete a transaction and its sub-rows.
    Delete {
        /// Transaction id
        id: String,
    },
    /// Show one transaction.
    Show {
        /// Transaction id
        id: String,
    },
    /// List all transactions.
    List,
    /// Replace the whole ledger with the contents of a CSV file.
    Import {
        /// Path to CSV file
        file: String,
    },
    /// Export the ledger as CSV.
    Export {
        /// Output path (default: stdout)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show what undo and redo would do.
    History,
    /// Undo the last operation.
    Undo,
    /// Redo the last undone operation.
    Redo,
    /// Remove old backup and export files.
    Cleanup {
        /// Age threshold in days (default: retention_days setting)
        #[arg(long)]
        days: Option<u64>,
        /// List the files without deleting them
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/transactions_backup_YYYYMMDD_HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Optional transaction fields shared by `add` and `update`.
#[derive(Args, Debug, Default, Clone)]
pub struct RecordFields {
    /// Parent transaction id; marks this row as a sub-row
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long = "in-amount", allow_hyphen_values = true)]
    pub in_amount: Option<Decimal>,
    #[arg(long = "in-currency")]
    pub in_currency: Option<String>,
    #[arg(long = "out-amount", allow_hyphen_values = true)]
    pub out_amount: Option<Decimal>,
    #[arg(long = "out-currency")]
    pub out_currency: Option<String>,
    /// Fee amount or "auto"
    #[arg(long, allow_hyphen_values = true)]
    pub fee: Option<Fee>,
    #[arg(long = "fee-currency")]
    pub fee_currency: Option<String>,
    #[arg(long = "usd-value", allow_hyphen_values = true)]
    pub usd_value: Option<Decimal>,
    #[arg(long)]
    pub network: Option<String>,
    /// Tag (repeatable); replaces all existing tags
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub note: Option<String>,
}
