use std::path::PathBuf;

use crate::codec::unique_backup_path;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::ledger::Ledger;
use crate::settings::get_data_dir;

pub fn run(output: Option<String>) -> Result<()> {
    let ledger = Ledger::open(&get_data_dir())?;

    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let backups_dir = ledger.backups_dir();
            std::fs::create_dir_all(&backups_dir)?;
            unique_backup_path(&backups_dir)
        }
    };

    ledger.snapshot_to(&dest_path)?;

    let size = std::fs::metadata(&dest_path)?.len();
    println!("Backup saved to {}", dest_path.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}
