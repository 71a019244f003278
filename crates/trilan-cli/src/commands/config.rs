use std::env;
use std::path::PathBuf;

use trilan_core::config::{CloudConfig, ConfigError};

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    normalize_text_option, CliProfile, CliProfilesConfig, API_KEY_ENV, PROJECT_ID_ENV,
};
use crate::error::CliError;

/// Values given to `config init`; unset ones keep the profile's current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub auth_url: Option<String>,
    pub secure_token_url: Option<String>,
    pub firestore_url: Option<String>,
    pub watch_interval_secs: Option<u64>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_key,
            project_id,
            web_config,
            auth_url,
            secure_token_url,
            firestore_url,
            watch_interval,
            no_activate,
        } => {
            let update = ProfileUpdate {
                api_key,
                project_id,
                auth_url,
                secure_token_url,
                firestore_url,
                watch_interval_secs: watch_interval,
            };
            run_config_init(global_profile, update, web_config, no_activate)
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    web_config: Option<PathBuf>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let web_config = match web_config {
        Some(path) => {
            let payload = std::fs::read_to_string(&path)?;
            let parsed = CloudConfig::from_web_config(&payload)?;
            println!("Loaded Firebase web config from {}", path.display());
            Some(parsed)
        }
        None => None,
    };

    let profile = config.profile_mut_or_default(&profile_name);
    merge_profile(
        profile,
        update,
        web_config.as_ref(),
        normalize_text_option(env::var(API_KEY_ENV).ok()),
        normalize_text_option(env::var(PROJECT_ID_ENV).ok()),
    );
    match profile.cloud_config_with(None, None) {
        Ok(_) | Err(ConfigError::Incomplete(_)) => {}
        Err(error) => return Err(error.into()),
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_fields(profile);
    if missing_fields.is_empty() {
        println!(
            "Cloud sync profile '{profile_name}' is ready. Run `trilan auth login --user <name> --password <password>`."
        );
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

/// Apply explicit values, then the web config, then the environment, over what
/// the profile already holds.
pub fn merge_profile(
    profile: &mut CliProfile,
    update: ProfileUpdate,
    web_config: Option<&CloudConfig>,
    env_api_key: Option<String>,
    env_project_id: Option<String>,
) {
    let api_key = normalize_text_option(update.api_key)
        .or_else(|| web_config.map(|web| web.api_key.clone()))
        .or(env_api_key);
    let project_id = normalize_text_option(update.project_id)
        .or_else(|| web_config.map(|web| web.project_id.clone()))
        .or(env_project_id);

    if let Some(value) = api_key {
        profile.api_key = Some(value);
    }
    if let Some(value) = project_id {
        profile.project_id = Some(value);
    }
    if let Some(value) = normalize_text_option(update.auth_url) {
        profile.auth_url = Some(value);
    }
    if let Some(value) = normalize_text_option(update.secure_token_url) {
        profile.secure_token_url = Some(value);
    }
    if let Some(value) = normalize_text_option(update.firestore_url) {
        profile.firestore_url = Some(value);
    }
    if let Some(value) = update.watch_interval_secs {
        profile.watch_interval_secs = Some(value);
    }
}

pub fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.api_key().is_none() {
        missing.push("api_key");
    }
    if profile.project_id().is_none() {
        missing.push("project_id");
    }
    missing
}
