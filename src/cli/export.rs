use std::path::PathBuf;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::settings::get_data_dir;

/// Write the ledger as CSV to `output`, or to stdout when no path is given.
pub fn run(output: Option<String>) -> Result<()> {
    let ledger = Ledger::open(&get_data_dir())?;
    let text = ledger.export_bulk_text()?;

    match output {
        Some(path) => {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, text)?;
            eprintln!("Exported to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
