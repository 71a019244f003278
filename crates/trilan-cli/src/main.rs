//! Trilan CLI - Command-line interface for the trilingual glossary
//!
//! Everything works offline against the local database. With a cloud profile
//! signed in, each change is mirrored to the cloud before the command exits.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use std::path::Path;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use trilan_core::SyncOptions;

use crate::cli::{CategoryCommands, Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::category::run_category;
use crate::commands::common::{resolve_db_path, Workspace};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, CategoryChange};
use crate::commands::export::{run_export, run_import};
use crate::commands::list::run_list;
use crate::commands::search::{run_lookup, run_search};
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trilan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Add {
            kind,
            fields,
            category,
        } => {
            mutating(&db_path, profile, |workspace| {
                run_add(workspace, kind, &fields, category).map(|_| ())
            })
            .await
        }
        Commands::Category { command } => {
            if matches!(command, CategoryCommands::List { .. }) {
                read_only(&db_path, |workspace| run_category(workspace, command))
            } else {
                mutating(&db_path, profile, |workspace| run_category(workspace, command)).await
            }
        }
        Commands::List {
            kind,
            category,
            json,
        } => read_only(&db_path, |workspace| run_list(workspace, kind, category, json)),
        Commands::Search { kind, query, json } => {
            read_only(&db_path, |workspace| run_search(workspace, kind, &query, json))
        }
        Commands::Lookup { query, json } => {
            read_only(&db_path, |workspace| run_lookup(workspace, &query, json))
        }
        Commands::Edit {
            kind,
            id,
            fields,
            category,
            uncategorize,
        } => {
            let change = CategoryChange::from_args(category, uncategorize);
            mutating(&db_path, profile, |workspace| {
                run_edit(workspace, kind, id, &fields, change)
            })
            .await
        }
        Commands::Delete { kind, id } => {
            mutating(&db_path, profile, |workspace| run_delete(workspace, kind, id)).await
        }
        Commands::Export { output } => {
            read_only(&db_path, |workspace| run_export(workspace, output.as_deref()))
        }
        Commands::Import { path } => {
            mutating(&db_path, profile, |workspace| run_import(workspace, &path)).await
        }
        Commands::Stats { json } => read_only(&db_path, |workspace| run_stats(workspace, json)),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Sync { command } => {
            let options = SyncOptions {
                live_updates: matches!(command, SyncCommands::Watch),
            };
            let workspace = Workspace::open(&db_path, profile, options).await?;
            let result = run_sync(&workspace, command).await;
            workspace.finish().await;
            result
        }
        Commands::Config { command } => run_config(command, profile),
        Commands::Auth { command } => run_auth(command, profile, &db_path).await,
    }
}

fn read_only<T>(
    db_path: &Path,
    action: impl FnOnce(&Workspace) -> Result<T, CliError>,
) -> Result<T, CliError> {
    action(&Workspace::local(db_path)?)
}

/// Run `action` with sync attached, then wait for the pushes it triggered.
async fn mutating<T>(
    db_path: &Path,
    profile: Option<&str>,
    action: impl FnOnce(&Workspace) -> Result<T, CliError>,
) -> Result<T, CliError> {
    let workspace = Workspace::open(
        db_path,
        profile,
        SyncOptions {
            live_updates: false,
        },
    )
    .await?;
    let result = action(&workspace);
    workspace.finish().await;
    result
}
