use colored::Colorize;

use crate::cleanup::{days, remove_stale_files};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::settings::{get_data_dir, load_settings};

pub fn run(days_old: Option<u64>, dry_run: bool) -> Result<()> {
    let days_old = days_old.unwrap_or_else(|| load_settings().retention_days);
    let ledger = Ledger::open(&get_data_dir())?;
    let protected = ledger.history().referenced_backups();

    let files = remove_stale_files(ledger.data_dir(), days(days_old), &protected, dry_run)?;
    if files.is_empty() {
        println!("No files older than {days_old} days.");
        return Ok(());
    }

    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in &files {
        println!("  {}", path.display().to_string().dimmed());
    }
    println!("{verb} {} files older than {days_old} days", files.len());
    Ok(())
}
