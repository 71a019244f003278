//! Identity: who is signed in, how their session persists, and how
//! credentials are exchanged for a session.

mod firebase;
mod memory;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::unix_timestamp_now;

pub use firebase::FirebaseAuthProvider;
pub use memory::MemoryIdentityProvider;

const EXPIRY_SKEW_SECONDS: i64 = 60;
const HANDLE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._+-]*$";

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable per-user key; namespaces the user's remote collections
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    /// Handle stamped on new records: the display name, else the email's local part.
    #[must_use]
    pub fn handle(&self) -> Option<String> {
        if let Some(name) = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            return Some(name.to_string());
        }

        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .map(str::trim)
            .filter(|local| !local.is_empty())
            .map(ToString::to_string)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.uid
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub identity: Identity,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .finish()
    }
}

/// What the user presents to sign in
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Token from a third-party identity provider's interactive flow
    OAuth {
        provider_id: String,
        id_token: String,
    },
    /// Handle and secret; the handle becomes a synthetic email address
    Handle { handle: String, secret: String },
}

impl Credentials {
    pub fn handle(handle: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::Handle {
            handle: handle.into(),
            secret: secret.into(),
        }
    }

    pub fn google(id_token: impl Into<String>) -> Self {
        Self::OAuth {
            provider_id: "google.com".to_string(),
            id_token: id_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth { provider_id, .. } => formatter
                .debug_struct("OAuth")
                .field("provider_id", provider_id)
                .field("id_token", &"[REDACTED]")
                .finish(),
            Self::Handle { handle, .. } => formatter
                .debug_struct("Handle")
                .field("handle", handle)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Cloud sign-in is not configured. Run `trilan config init` first.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Wrong password for this account.")]
    WrongCredential,
    #[error("'{0}' is not a valid user name.")]
    MalformedIdentifier(String),
    #[error("Password is too weak: {0}")]
    WeakSecret(String),
    #[error("An account with this user name already exists.")]
    DuplicateAccount,
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where a session lives between runs
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session persistence that forgets everything when the process exits
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: Arc<Mutex<Option<AuthSession>>>,
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store lock poisoned".to_string()))?
            .clone())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        *self
            .session
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store lock poisoned".to_string()))? =
            Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        *self
            .session
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store lock poisoned".to_string()))? =
            None;
        Ok(())
    }
}

/// Exchanges credentials for a session and tracks the current one.
///
/// The sync coordinator is the only caller of `sign_in`/`sign_out`, and it
/// applies the matching state transition as soon as the call returns.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Sign in, registering the account first when a handle is unknown.
    fn sign_in(
        &self,
        credentials: Credentials,
    ) -> impl Future<Output = AuthResult<AuthSession>> + Send;

    /// Load the persisted session, refreshing it when expired.
    fn restore_session(&self) -> impl Future<Output = AuthResult<Option<AuthSession>>> + Send;

    /// Exchange the current refresh token for a fresh id token.
    fn refresh_session(&self) -> impl Future<Output = AuthResult<AuthSession>> + Send;

    fn sign_out(&self) -> AuthResult<()>;

    fn current_session(&self) -> Option<AuthSession>;

    fn current_identity(&self) -> Option<Identity> {
        self.current_session().map(|session| session.identity)
    }

    fn current_handle(&self) -> Option<String> {
        self.current_identity().and_then(|identity| identity.handle())
    }
}

/// Map a handle to the email address the identity service knows it by.
pub fn synthetic_email(handle: &str, domain: &str) -> AuthResult<String> {
    let handle = handle.trim();
    let pattern = Regex::new(HANDLE_PATTERN)
        .map_err(|_| AuthError::InvalidConfiguration("handle pattern failed to compile"))?;
    if !pattern.is_match(handle) {
        return Err(AuthError::MalformedIdentifier(handle.to_string()));
    }
    Ok(format!("{handle}@{}", domain.trim()))
}

pub(crate) fn validate_secret(secret: &str) -> AuthResult<()> {
    if secret.is_empty() {
        return Err(AuthError::WeakSecret("password is required".to_string()));
    }
    Ok(())
}
