//! Identity provider backed by the Firebase Auth REST API.

use std::sync::{Arc, Mutex};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{
    synthetic_email, validate_secret, AuthError, AuthResult, AuthSession, Credentials, Identity,
    IdentityProvider, SessionPersistence,
};
use crate::config::CloudConfig;
use crate::util::{body_excerpt, unix_timestamp_now};

const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;
const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Clone)]
pub struct FirebaseAuthProvider<S: SessionPersistence> {
    auth_url: String,
    token_url: String,
    api_key: String,
    email_domain: String,
    client: Client,
    store: S,
    current: Arc<Mutex<Option<AuthSession>>>,
}

impl<S: SessionPersistence> FirebaseAuthProvider<S> {
    pub fn new(config: &CloudConfig, store: S) -> AuthResult<Self> {
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration("API key must not be empty"));
        }
        if config.validate().is_err() {
            return Err(AuthError::InvalidConfiguration(
                "cloud configuration failed validation",
            ));
        }

        Ok(Self {
            auth_url: config.auth_base_url(),
            token_url: config.secure_token_base_url(),
            api_key,
            email_domain: config.synthetic_email_domain.trim().to_string(),
            client: Client::builder().build()?,
            store,
            current: Arc::new(Mutex::new(None)),
        })
    }

    async fn sign_in_with_handle(&self, handle: &str, secret: &str) -> AuthResult<AuthSession> {
        let email = synthetic_email(handle, &self.email_domain)?;
        validate_secret(secret)?;

        let payload = json!({
            "email": email,
            "password": secret,
            "returnSecureToken": true,
        });
        match self
            .identity_call::<AccountResponse>("accounts:signInWithPassword", &payload)
            .await
        {
            Ok(response) => response.into_session(),
            Err(CallError::Api(error)) if error.code == "EMAIL_NOT_FOUND" => {
                tracing::info!("No account for handle '{}'; registering", handle.trim());
                self.register(&email, handle.trim(), secret, AuthError::DuplicateAccount)
                    .await
            }
            // With email enumeration protection an unknown account and a wrong
            // password are reported the same way; registration tells them apart.
            Err(CallError::Api(error)) if error.code == "INVALID_LOGIN_CREDENTIALS" => {
                self.register(&email, handle.trim(), secret, AuthError::WrongCredential)
                    .await
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn register(
        &self,
        email: &str,
        handle: &str,
        secret: &str,
        on_existing: AuthError,
    ) -> AuthResult<AuthSession> {
        let payload = json!({
            "email": email,
            "password": secret,
            "returnSecureToken": true,
        });
        let created = match self
            .identity_call::<AccountResponse>("accounts:signUp", &payload)
            .await
        {
            Ok(created) => created.into_session()?,
            Err(CallError::Api(error)) if error.code == "EMAIL_EXISTS" => return Err(on_existing),
            Err(error) => return Err(error.into()),
        };

        let payload = json!({
            "idToken": created.id_token,
            "displayName": handle,
            "returnSecureToken": true,
        });
        let updated = self
            .identity_call::<AccountResponse>("accounts:update", &payload)
            .await
            .map_err(AuthError::from)?;

        let mut session = created;
        session.identity.display_name = Some(handle.to_string());
        if let (Some(id_token), Some(refresh_token)) = (updated.id_token, updated.refresh_token) {
            session.id_token = id_token;
            session.refresh_token = refresh_token;
            session.expires_at = expires_at(updated.expires_in.as_deref());
        }
        Ok(session)
    }

    async fn sign_in_with_idp(&self, provider_id: &str, id_token: &str) -> AuthResult<AuthSession> {
        if id_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "identity provider token must not be empty",
            ));
        }

        let payload = json!({
            "postBody": format!("id_token={}&providerId={}", id_token.trim(), provider_id.trim()),
            "requestUri": IDP_REQUEST_URI,
            "returnIdpCredential": true,
            "returnSecureToken": true,
        });
        self.identity_call::<AccountResponse>("accounts:signInWithIdp", &payload)
            .await
            .map_err(AuthError::from)?
            .into_session()
    }

    async fn exchange_refresh_token(&self, previous: &AuthSession) -> AuthResult<AuthSession> {
        if previous.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = json!({
            "grant_type": "refresh_token",
            "refresh_token": previous.refresh_token,
        });
        let response = self
            .post::<RefreshResponse>(format!("{}/token", self.token_url), &payload)
            .await
            .map_err(AuthError::from)?;

        if response.user_id.as_deref() != Some(previous.identity.uid.as_str()) {
            return Err(AuthError::Api(
                "Refresh response belongs to a different user".to_string(),
            ));
        }

        Ok(AuthSession {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: expires_at(response.expires_in.as_deref()),
            identity: previous.identity.clone(),
        })
    }

    async fn identity_call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, CallError> {
        self.post(format!("{}/{method}", self.auth_url), payload)
            .await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        payload: &serde_json::Value,
    ) -> Result<T, CallError> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|error| CallError::Auth(error.into()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Api(parse_api_error(status, &body)));
        }
        response
            .json::<T>()
            .await
            .map_err(|error| CallError::Auth(error.into()))
    }

    fn remember(&self, session: Option<&AuthSession>) -> AuthResult<()> {
        match session {
            Some(session) => self.store.save_session(session)?,
            None => self.store.clear_session()?,
        }
        *self
            .current
            .lock()
            .map_err(|_| AuthError::SecureStorage("session lock poisoned".to_string()))? =
            session.cloned();
        Ok(())
    }
}

impl<S: SessionPersistence> IdentityProvider for FirebaseAuthProvider<S> {
    async fn sign_in(&self, credentials: Credentials) -> AuthResult<AuthSession> {
        let session = match &credentials {
            Credentials::Handle { handle, secret } => {
                self.sign_in_with_handle(handle, secret).await?
            }
            Credentials::OAuth {
                provider_id,
                id_token,
            } => self.sign_in_with_idp(provider_id, id_token).await?,
        };

        self.remember(Some(&session))?;
        tracing::info!("Signed in as {}", session.identity.uid);
        Ok(session)
    }

    async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            self.remember(Some(&stored_session))?;
            return Ok(Some(stored_session));
        }

        match self.exchange_refresh_token(&stored_session).await {
            Ok(refreshed) => {
                self.remember(Some(&refreshed))?;
                Ok(Some(refreshed))
            }
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.remember(None)?;
                Ok(None)
            }
        }
    }

    async fn refresh_session(&self) -> AuthResult<AuthSession> {
        let current = self
            .current_session()
            .ok_or_else(|| AuthError::Api("No active session to refresh".to_string()))?;
        let refreshed = self.exchange_refresh_token(&current).await?;
        self.remember(Some(&refreshed))?;
        Ok(refreshed)
    }

    fn sign_out(&self) -> AuthResult<()> {
        self.remember(None)
    }

    fn current_session(&self) -> Option<AuthSession> {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.clone())
    }
}

enum CallError {
    Auth(AuthError),
    Api(ApiError),
}

impl From<CallError> for AuthError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Auth(error) => error,
            CallError::Api(error) => error.into(),
        }
    }
}

/// Error body returned by the identity service: `{"error": {"message": "CODE : detail"}}`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ApiError {
    status: StatusCode,
    code: String,
    detail: Option<String>,
}

impl From<ApiError> for AuthError {
    fn from(error: ApiError) -> Self {
        match error.code.as_str() {
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => Self::WrongCredential,
            "INVALID_EMAIL" | "MISSING_EMAIL" => {
                Self::MalformedIdentifier(error.detail.unwrap_or_default())
            }
            "WEAK_PASSWORD" => Self::WeakSecret(
                error
                    .detail
                    .unwrap_or_else(|| "Password should be at least 6 characters".to_string()),
            ),
            "EMAIL_EXISTS" => Self::DuplicateAccount,
            _ => Self::Api(match error.detail {
                Some(detail) => format!("{}: {} ({})", error.code, detail, error.status.as_u16()),
                None => format!("{} ({})", error.code, error.status.as_u16()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .or_else(|| body_excerpt(body))
        .unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));

    let (code, detail) = match message.split_once(':') {
        Some((code, detail)) => (code.trim().to_string(), Some(detail.trim().to_string())),
        None => (message.trim().to_string(), None),
    };
    ApiError {
        status,
        code,
        detail: detail.filter(|detail| !detail.is_empty()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    local_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

impl AccountResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        match (self.id_token, self.refresh_token, self.local_id) {
            (Some(id_token), Some(refresh_token), Some(uid)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at: expires_at(self.expires_in.as_deref()),
                identity: Identity {
                    uid,
                    email: self.email,
                    display_name: self
                        .display_name
                        .filter(|name| !name.trim().is_empty()),
                },
            }),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    user_id: Option<String>,
}

fn expires_at(expires_in: Option<&str>) -> i64 {
    let seconds = expires_in
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
    unix_timestamp_now().saturating_add(seconds)
}
