use std::time::Duration;

use serde::Serialize;
use trilan_core::mirror::MirrorError;
use trilan_core::{StoreStats, SyncError, SyncPhase};

use crate::cli::SyncCommands;
use crate::commands::common::Workspace;
use crate::error::CliError;

/// Id tokens live for an hour; refresh well before that.
const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(45 * 60);
const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub profile: Option<String>,
    pub status: String,
    pub phase: Option<SyncPhase>,
    pub user: Option<String>,
    pub stats: StoreStats,
}

pub async fn run_sync(workspace: &Workspace, command: SyncCommands) -> Result<(), CliError> {
    match command {
        SyncCommands::Push => {
            workspace.require_sync()?.force_push().await?;
            println!("Uploaded local data to the cloud");
            Ok(())
        }
        SyncCommands::Pull => {
            workspace.require_sync()?.force_pull().await?;
            println!("Replaced local data with the cloud copy");
            Ok(())
        }
        SyncCommands::Status { json } => run_sync_status(workspace, json),
        SyncCommands::Watch => run_sync_watch(workspace).await,
    }
}

pub fn sync_status_item(workspace: &Workspace) -> Result<SyncStatusItem, CliError> {
    let stats = workspace.store().stats()?;
    Ok(workspace.sync().map_or_else(
        || SyncStatusItem {
            profile: None,
            status: "Local only".to_string(),
            phase: None,
            user: None,
            stats,
        },
        |sync| SyncStatusItem {
            profile: workspace.profile_name().map(ToString::to_string),
            status: sync.status().to_string(),
            phase: Some(sync.phase()),
            user: sync.current_handle(),
            stats,
        },
    ))
}

fn run_sync_status(workspace: &Workspace, as_json: bool) -> Result<(), CliError> {
    let item = sync_status_item(workspace)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    match (&item.profile, &item.user) {
        (Some(profile), Some(user)) => {
            println!("{} (profile '{profile}', signed in as {user})", item.status);
        }
        (Some(profile), None) => println!("{} (profile '{profile}')", item.status),
        _ => println!("{}", item.status),
    }
    println!("{}", format_stats(item.stats));
    Ok(())
}

/// Apply cloud changes as they arrive until Ctrl+C.
async fn run_sync_watch(workspace: &Workspace) -> Result<(), CliError> {
    let sync = workspace.require_sync()?;
    let Some(user) = sync.current_handle() else {
        return Err(SyncError::Unauthenticated.into());
    };
    if sync.phase() != SyncPhase::SignedInSynced {
        return Err(SyncError::RemoteUnavailable(MirrorError::Offline).into());
    }

    println!("Watching cloud changes as {user}. Press Ctrl+C to stop.");
    let mut last_stats = workspace.store().stats()?;
    println!("{}", format_stats(last_stats));

    let mut refresh = tokio::time::interval(TOKEN_REFRESH_INTERVAL);
    refresh.tick().await;
    let mut report = tokio::time::interval(STATS_REPORT_INTERVAL);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = refresh.tick() => {
                if let Err(error) = sync.refresh_session().await {
                    tracing::warn!("Session refresh failed: {}", error);
                }
            }
            _ = report.tick() => {
                let stats = workspace.store().stats()?;
                if stats != last_stats {
                    println!("{}", format_stats(stats));
                    last_stats = stats;
                }
            }
        }
    }

    println!("Stopped watching");
    Ok(())
}

pub fn format_stats(stats: StoreStats) -> String {
    format!(
        "categories={} dictionary={} phrases={}",
        stats.categories, stats.dictionary, stats.phrases
    )
}
