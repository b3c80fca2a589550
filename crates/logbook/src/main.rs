//! `logbook` - CLI for the flight logbook
//!
//! This binary previews and commits logbook exports and reports on what the
//! logbook database holds.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs::File;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info};

use logbook::cli::{Cli, Command, ConfigCommand, ImportCommand, StatusCommand};
use logbook::import::{self, ImportOptions};
use logbook::{init_logging, Config, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Import(import_cmd) => handle_import(&config, &import_cmd),
        Command::Status(status_cmd) => handle_status(&config, &status_cmd),
        Command::Config(config_cmd) => handle_config(&config, cli.config, config_cmd),
    }
}

fn handle_import(config: &Config, cmd: &ImportCommand) -> anyhow::Result<()> {
    let options = ImportOptions {
        force_tsv: cmd.tsv,
        ..ImportOptions::from_config(config)
    };

    let source = cmd
        .file
        .as_ref()
        .map(|path| {
            File::open(path).with_context(|| format!("failed to open {}", path.display()))
        })
        .transpose()?;

    let report = if cmd.commit {
        let db_path = config.database_path();
        let storage = Storage::open(&db_path)?;
        let user = storage.ensure_user(&cmd.user)?;
        debug!(user = %user, db = %db_path.display(), "Committing import");
        import::commit(&storage, user, source, &options)?
    } else {
        import::preview(source, &options)?
    };

    info!(
        rows = report.len(),
        failed = report.failures(),
        committed = cmd.commit,
        "Import finished"
    );

    if cmd.json {
        let output = serde_json::json!({
            "committed": cmd.commit,
            "summary": report.summary(),
            "results": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", report.to_html());
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let db_path = config.database_path();
    let storage = Storage::open(&db_path)?;

    let user = match &cmd.user {
        Some(name) => match storage.find_user(name)? {
            Some(id) => Some(id),
            None => bail!("no such user: {name}"),
        },
        None => None,
    };
    let stats = storage.stats(user)?;

    if cmd.json {
        let status = serde_json::json!({
            "database_path": db_path,
            "user": cmd.user,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("logbook status");
        println!("--------------");
        println!("Database:      {}", db_path.display());
        if let Some(name) = &cmd.user {
            println!("User:          {name}");
        } else {
            println!("Users:         {}", stats.users);
        }
        println!("Planes:        {}", stats.planes);
        println!("Flights:       {}", stats.flights);
        println!("Events:        {}", stats.non_flights);
        println!("Total hours:   {:.1}", stats.total_hours);
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(
    config: &Config,
    config_path: Option<std::path::PathBuf>,
    cmd: ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Import]");
                println!("  Sample size:        {} bytes", config.import.sample_size);
                println!("  Atomic commit:      {}", config.import.atomic_commit);
                println!("  Unknown plane:      {}", config.import.unknown_tailnumber);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
