//! Cloud configuration shared by every client.
//!
//! Trilan runs local-only until a cloud project is configured. The values
//! here are the public web-app settings of a Firebase project (API key and
//! project id), plus endpoint overrides for emulators and tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_SYNTHETIC_EMAIL_DOMAIN: &str = "google.com";
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 5;

/// Errors from resolving cloud configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Cloud sync is partially configured: {0} is missing")]
    Incomplete(&'static str),

    #[error("Invalid cloud configuration: {0}")]
    Invalid(String),
}

/// Settings needed to reach the identity service and the document store.
///
/// These are safe-to-ship public values. Secrets never live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    pub api_key: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firestore_url: Option<String>,
    /// Domain appended to a handle to form the sign-in email
    #[serde(default = "default_synthetic_email_domain")]
    pub synthetic_email_domain: String,
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

impl CloudConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            auth_url: None,
            secure_token_url: None,
            firestore_url: None,
            synthetic_email_domain: default_synthetic_email_domain(),
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
        }
    }

    /// Parse the `firebaseConfig` object handed out by the Firebase console.
    ///
    /// Only `apiKey` and `projectId` are used; the other web-app keys are ignored.
    pub fn from_web_config(payload: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WebConfig {
            api_key: Option<String>,
            project_id: Option<String>,
        }

        let web: WebConfig = serde_json::from_str(payload)
            .map_err(|error| ConfigError::Invalid(format!("web config is not valid JSON: {error}")))?;
        resolve_optional_cloud_config(web.api_key, web.project_id)?
            .ok_or(ConfigError::Incomplete("apiKey"))
    }

    /// Check required values and endpoint schemes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Incomplete("api_key"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Incomplete("project_id"));
        }
        for (field, value) in [
            ("auth_url", &self.auth_url),
            ("secure_token_url", &self.secure_token_url),
            ("firestore_url", &self.firestore_url),
        ] {
            if let Some(url) = value {
                if !is_http_url(url) {
                    return Err(ConfigError::Invalid(format!(
                        "{field} must include http:// or https://"
                    )));
                }
            }
        }
        if self.synthetic_email_domain.trim().is_empty()
            || self.synthetic_email_domain.contains('@')
        {
            return Err(ConfigError::Invalid(
                "synthetic_email_domain must be a bare domain".to_string(),
            ));
        }
        if self.watch_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watch_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn auth_base_url(&self) -> String {
        endpoint(self.auth_url.as_deref(), DEFAULT_AUTH_URL)
    }

    pub fn secure_token_base_url(&self) -> String {
        endpoint(self.secure_token_url.as_deref(), DEFAULT_SECURE_TOKEN_URL)
    }

    pub fn firestore_base_url(&self) -> String {
        endpoint(self.firestore_url.as_deref(), DEFAULT_FIRESTORE_URL)
    }

    /// Root of the project's default database.
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.firestore_base_url(),
            self.project_id.trim()
        )
    }

    pub const fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}

/// Build a config from optional key and project id.
///
/// Returns `Ok(None)` when neither is set (local-only mode) and an error when
/// only one of them is.
pub fn resolve_optional_cloud_config(
    api_key: Option<String>,
    project_id: Option<String>,
) -> Result<Option<CloudConfig>, ConfigError> {
    match (
        normalize_text_option(api_key),
        normalize_text_option(project_id),
    ) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Incomplete("project_id")),
        (None, Some(_)) => Err(ConfigError::Incomplete("api_key")),
        (Some(api_key), Some(project_id)) => Ok(Some(CloudConfig::new(api_key, project_id))),
    }
}

fn endpoint(custom: Option<&str>, default: &str) -> String {
    custom
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn default_synthetic_email_domain() -> String {
    DEFAULT_SYNTHETIC_EMAIL_DOMAIN.to_string()
}

const fn default_watch_interval_secs() -> u64 {
    DEFAULT_WATCH_INTERVAL_SECS
}
