use std::path::Path;
use std::sync::Arc;

use trilan_core::auth::{AuthError, Credentials};
use trilan_core::{Reconciliation, SyncError, SyncOptions, SyncPhase};

use crate::auth::{clear_stored_session, load_stored_session};
use crate::cli::AuthCommands;
use crate::commands::common::{
    build_coordinator, format_timestamp, open_store, resolve_cloud_config, Workspace,
};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub async fn run_auth(
    command: AuthCommands,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            user,
            password,
            google_id_token,
            pull,
        } => {
            let credentials = match (google_id_token, user, password) {
                (Some(token), _, _) => Credentials::google(token),
                (None, Some(user), Some(password)) => Credentials::handle(user, password),
                _ => {
                    return Err(CliError::Config(
                        "Pass --user and --password, or --google-id-token".to_string(),
                    ))
                }
            };
            run_login(credentials, pull, global_profile, db_path).await
        }
        AuthCommands::Status => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(global_profile);
            if config.cloud_config(&profile_name)?.is_none() {
                println!("Profile '{profile_name}' is not configured for cloud sync.");
                return Ok(());
            }

            if let Some(session) = load_stored_session(&profile_name)? {
                let handle = session
                    .identity
                    .handle()
                    .unwrap_or_else(|| session.identity.uid.clone());
                let state = if session.is_expired() {
                    "expired, refreshed on next use"
                } else {
                    "valid"
                };
                println!(
                    "Profile '{}' is signed in as {} (token {} until {})",
                    profile_name,
                    handle,
                    state,
                    format_timestamp(session.expires_at)
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let workspace = Workspace::open(
                db_path,
                global_profile,
                SyncOptions {
                    live_updates: false,
                },
            )
            .await?;
            let profile_name = if let Some(sync) = workspace.sync() {
                sync.sign_out()?;
                workspace.profile_name().unwrap_or_default().to_string()
            } else {
                let config = CliProfilesConfig::load().map_err(CliError::Config)?;
                let profile_name = config.resolve_profile_name(global_profile);
                clear_stored_session(&profile_name)?;
                profile_name
            };

            println!("Signed out profile '{profile_name}'. Local data was kept.");
            Ok(())
        }
    }
}

/// Sign in, then upload local data or replace it with the cloud copy.
///
/// The upload only happens when there is something local worth keeping.
async fn run_login(
    credentials: Credentials,
    pull: bool,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let (profile_name, config) =
        resolve_cloud_config(global_profile)?.ok_or(AuthError::NotConfigured)?;
    let store = open_store(db_path)?;
    let reconciliation = Reconciliation::from_prompt(pull, store.has_entries()?);
    let sync = build_coordinator(
        &profile_name,
        &config,
        Arc::clone(&store),
        SyncOptions {
            live_updates: false,
        },
    )?;

    match sync.sign_in(credentials, reconciliation).await {
        Ok(identity) => {
            let handle = identity.handle().unwrap_or(identity.uid);
            println!("Signed in profile '{profile_name}' as {handle}");
            match reconciliation {
                Reconciliation::Pull => println!("Local data replaced with the cloud copy."),
                Reconciliation::Push => println!("Local data uploaded to the cloud."),
                Reconciliation::None => {}
            }
            Ok(())
        }
        Err(SyncError::Reconciliation { source }) if sync.phase() == SyncPhase::SignedInOffline => {
            println!("Signed in profile '{profile_name}', but the first sync failed: {source}");
            println!("Run `trilan sync push` or `trilan sync pull` once the cloud is reachable.");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
