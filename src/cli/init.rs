use std::path::PathBuf;

use crate::db::demo_records;
use crate::error::Result;
use crate::ledger::{Ledger, BACKUPS_DIR, EXPORTS_DIR};
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, demo: bool) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(resolved.join(BACKUPS_DIR))?;
    std::fs::create_dir_all(resolved.join(EXPORTS_DIR))?;

    let mut ledger = Ledger::open(&resolved)?;
    let defaults = if demo { demo_records() } else { Vec::new() };
    let records = ledger.initialize_if_empty(&defaults)?;

    println!("Initialized txledger at {}", resolved.display());
    println!("{} transactions", records.len());
    Ok(())
}
