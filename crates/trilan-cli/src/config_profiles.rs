//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trilan_core::config::{resolve_optional_cloud_config, CloudConfig, ConfigError};

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const PROFILE_ENV: &str = "TRILAN_PROFILE";
pub const API_KEY_ENV: &str = "TRILAN_FIREBASE_API_KEY";
pub const PROJECT_ID_ENV: &str = "TRILAN_FIREBASE_PROJECT_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// Cloud settings for one profile; unset values fall back to the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub secure_token_url: Option<String>,
    #[serde(default)]
    pub firestore_url: Option<String>,
    #[serde(default)]
    pub watch_interval_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("trilan")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    trilan_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn env_text(name: &str) -> Option<String> {
    normalize_text_option(std::env::var(name).ok())
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(std::env::var(PROFILE_ENV).ok().as_deref()) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    /// Cloud config for `name`, with environment fallbacks for key and project.
    ///
    /// `Ok(None)` means the profile runs local-only.
    pub fn cloud_config(&self, name: &str) -> Result<Option<CloudConfig>, ConfigError> {
        self.profile(name)
            .cloned()
            .unwrap_or_default()
            .cloud_config_with(env_text(API_KEY_ENV), env_text(PROJECT_ID_ENV))
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn api_key(&self) -> Option<String> {
        normalize_text_option(self.api_key.clone())
    }

    pub fn project_id(&self) -> Option<String> {
        normalize_text_option(self.project_id.clone())
    }

    /// Build and validate the cloud config, using the given fallbacks when the
    /// profile leaves the key or project unset.
    pub fn cloud_config_with(
        &self,
        fallback_api_key: Option<String>,
        fallback_project_id: Option<String>,
    ) -> Result<Option<CloudConfig>, ConfigError> {
        let Some(mut config) = resolve_optional_cloud_config(
            self.api_key().or(fallback_api_key),
            self.project_id().or(fallback_project_id),
        )?
        else {
            return Ok(None);
        };

        config.auth_url = normalize_text_option(self.auth_url.clone());
        config.secure_token_url = normalize_text_option(self.secure_token_url.clone());
        config.firestore_url = normalize_text_option(self.firestore_url.clone());
        if let Some(seconds) = self.watch_interval_secs {
            config.watch_interval_secs = seconds;
        }
        config.validate()?;
        Ok(Some(config))
    }

    fn normalize(&mut self) {
        self.api_key = normalize_text_option(self.api_key.clone());
        self.project_id = normalize_text_option(self.project_id.clone());
        self.auth_url = normalize_text_option(self.auth_url.clone());
        self.secure_token_url = normalize_text_option(self.secure_token_url.clone());
        self.firestore_url = normalize_text_option(self.firestore_url.clone());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_key: Some(" web-key ".to_string()),
                project_id: Some(" trilan-demo ".to_string()),
                firestore_url: Some("  ".to_string()),
                watch_interval_secs: Some(10),
                ..CliProfile::default()
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        assert_eq!(
            loaded.profile("default"),
            Some(&CliProfile {
                api_key: Some("web-key".to_string()),
                project_id: Some("trilan-demo".to_string()),
                watch_interval_secs: Some(10),
                ..CliProfile::default()
            })
        );
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("mobile")), "mobile");
        assert_eq!(config.resolve_profile_name(None), "work");
    }

    #[test]
    fn empty_profile_without_fallbacks_is_local_only() {
        let config = CliProfile::default().cloud_config_with(None, None).unwrap();
        assert_eq!(config, None);
    }

    #[test]
    fn profile_values_win_over_fallbacks() {
        let profile = CliProfile {
            project_id: Some("from-profile".to_string()),
            firestore_url: Some("http://127.0.0.1:8080/v1".to_string()),
            ..CliProfile::default()
        };

        let config = profile
            .cloud_config_with(Some("env-key".to_string()), Some("env-project".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.project_id, "from-profile");
        assert_eq!(config.firestore_base_url(), "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn half_configured_profile_is_rejected() {
        let profile = CliProfile {
            api_key: Some("key".to_string()),
            ..CliProfile::default()
        };
        assert_eq!(
            profile.cloud_config_with(None, None),
            Err(ConfigError::Incomplete("project_id"))
        );
    }

    #[test]
    fn invalid_override_url_is_rejected() {
        let profile = CliProfile {
            api_key: Some("key".to_string()),
            project_id: Some("project".to_string()),
            auth_url: Some("localhost:9099".to_string()),
            ..CliProfile::default()
        };
        assert!(matches!(
            profile.cloud_config_with(None, None),
            Err(ConfigError::Invalid(_))
        ));
    }
}
