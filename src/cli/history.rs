use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::records::records_table;
use crate::error::Result;
use crate::ledger::{HistoryView, Ledger};
use crate::settings::get_data_dir;

fn print_labels(undo: &str, redo: &str) {
    if undo.is_empty() {
        println!("{}", "Nothing to undo".dimmed());
    } else {
        println!("{} {undo}", "Undo:".green().bold());
    }
    if redo.is_empty() {
        println!("{}", "Nothing to redo".dimmed());
    } else {
        println!("{} {redo}", "Redo:".yellow().bold());
    }
}

fn print_view(view: &HistoryView) {
    print_labels(&view.undo, &view.redo);
    println!();
    if view.table.is_empty() {
        println!("No transactions.");
    } else {
        println!("{}", records_table(&view.table));
    }
}

pub fn show() -> Result<()> {
    let ledger = Ledger::open(&get_data_dir())?;
    let (undo, redo) = ledger.undo_redo_labels();
    print_labels(&undo, &redo);

    let history = ledger.history();
    if history.is_empty() {
        return Ok(());
    }
    let cursor = history.cursor();
    let mut table = Table::new();
    table.set_header(vec!["#", "When", "Operation", ""]);
    for (i, op) in history.operations().iter().enumerate() {
        let marker = if Some(i) == cursor { "◀ current" } else { "" };
        let description = match cursor {
            Some(c) if i > c => op.description().dimmed().to_string(),
            None => op.description().dimmed().to_string(),
            _ => op.description(),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(op.timestamp.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(description),
            Cell::new(marker),
        ]);
    }
    let applied = cursor.map_or(0, |c| c + 1);
    println!();
    println!("{table}");
    println!("{applied} of {} operations applied", history.len());
    Ok(())
}

pub fn undo() -> Result<()> {
    let mut ledger = Ledger::open(&get_data_dir())?;
    let view = ledger.undo()?;
    println!("{}", "Undone.".green());
    print_view(&view);
    Ok(())
}

pub fn redo() -> Result<()> {
    let mut ledger = Ledger::open(&get_data_dir())?;
    let could_redo = ledger.history().can_redo();
    let view = ledger.redo()?;
    if could_redo {
        println!("{}", "Redone.".green());
    }
    print_view(&view);
    Ok(())
}
