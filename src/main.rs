mod cleanup;
mod cli;
mod codec;
mod db;
mod error;
mod fmt;
mod history;
mod ledger;
mod models;
mod settings;
mod store;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            log_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir, demo } => cli::init::run(data_dir, demo),
        Commands::Add {
            id,
            date,
            row_type,
            fields,
        } => cli::records::add(id, date, row_type, fields),
        Commands::Update {
            id,
            date,
            row_type,
            fields,
            clear,
        } => cli::records::update(&id, date, row_type, fields, &clear),
        Commands::Delete { id } => cli::records::delete(&id),
        Commands::Show { id } => cli::records::show(&id),
        Commands::List => cli::records::list(),
        Commands::Import { file } => cli::import::run(&file),
        Commands::Export { output } => cli::export::run(output),
        Commands::History => cli::history::show(),
        Commands::Undo => cli::history::undo(),
        Commands::Redo => cli::history::redo(),
        Commands::Cleanup { days, dry_run } => cli::cleanup::run(days, dry_run),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "txledger", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::debug!(kind = e.kind(), "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
