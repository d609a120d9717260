use std::path::PathBuf;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::settings::get_data_dir;

pub fn run(file: &str) -> Result<()> {
    let text = std::fs::read_to_string(PathBuf::from(file))?;
    let mut ledger = Ledger::open(&get_data_dir())?;

    let backup = ledger.ingest_bulk_text(&text)?;
    let count = ledger.get_all_records()?.len();

    println!("{count} transactions loaded from {file}");
    println!("Previous ledger backed up to {}", backup.display());
    Ok(())
}
