//! In-process identity provider for tests and offline demos.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    synthetic_email, validate_secret, AuthError, AuthResult, AuthSession, Credentials, Identity,
    IdentityProvider,
};
use crate::config::DEFAULT_SYNTHETIC_EMAIL_DOMAIN;
use crate::util::unix_timestamp_now;

const MIN_SECRET_CHARS: usize = 6;
const SESSION_LIFETIME_SECONDS: i64 = 3600;

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    secret: String,
    display_name: String,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    current: Option<AuthSession>,
    issued: u64,
}

/// Identity provider keeping accounts in memory.
///
/// Follows the hosted service's rules: unknown handles are registered on
/// first sign-in, secrets shorter than six characters are rejected as weak.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityProvider {
    state: Arc<Mutex<State>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with `handle` already registered.
    pub fn with_account(handle: &str, secret: &str) -> AuthResult<Self> {
        let provider = Self::new();
        let email = synthetic_email(handle, DEFAULT_SYNTHETIC_EMAIL_DOMAIN)?;
        let mut state = provider.lock()?;
        let uid = format!("uid-{}", state.accounts.len() + 1);
        state.accounts.insert(
            email,
            Account {
                uid,
                secret: secret.to_string(),
                display_name: handle.trim().to_string(),
            },
        );
        drop(state);
        Ok(provider)
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AuthError::SecureStorage("identity state lock poisoned".to_string()))
    }

    fn issue(state: &mut State, identity: Identity) -> AuthSession {
        state.issued += 1;
        AuthSession {
            id_token: format!("memory-id-{}", state.issued),
            refresh_token: format!("memory-refresh-{}", state.issued),
            expires_at: unix_timestamp_now() + SESSION_LIFETIME_SECONDS,
            identity,
        }
    }

    fn authenticate(&self, credentials: &Credentials) -> AuthResult<AuthSession> {
        let mut state = self.lock()?;
        let identity = match credentials {
            Credentials::Handle { handle, secret } => {
                let email = synthetic_email(handle, DEFAULT_SYNTHETIC_EMAIL_DOMAIN)?;
                validate_secret(secret)?;

                if let Some(account) = state.accounts.get(&email) {
                    if &account.secret != secret {
                        return Err(AuthError::WrongCredential);
                    }
                    Identity {
                        uid: account.uid.clone(),
                        email: Some(email),
                        display_name: Some(account.display_name.clone()),
                    }
                } else {
                    if secret.chars().count() < MIN_SECRET_CHARS {
                        return Err(AuthError::WeakSecret(format!(
                            "Password should be at least {MIN_SECRET_CHARS} characters"
                        )));
                    }
                    let account = Account {
                        uid: format!("uid-{}", state.accounts.len() + 1),
                        secret: secret.clone(),
                        display_name: handle.trim().to_string(),
                    };
                    let identity = Identity {
                        uid: account.uid.clone(),
                        email: Some(email.clone()),
                        display_name: Some(account.display_name.clone()),
                    };
                    state.accounts.insert(email, account);
                    identity
                }
            }
            Credentials::OAuth {
                provider_id,
                id_token,
            } => {
                if id_token.trim().is_empty() {
                    return Err(AuthError::InvalidConfiguration(
                        "identity provider token must not be empty",
                    ));
                }
                Identity {
                    uid: format!("{provider_id}:{}", id_token.trim()),
                    email: None,
                    display_name: None,
                }
            }
        };

        let session = Self::issue(&mut state, identity);
        state.current = Some(session.clone());
        Ok(session)
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, credentials: Credentials) -> AuthResult<AuthSession> {
        self.authenticate(&credentials)
    }

    async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self.current_session())
    }

    async fn refresh_session(&self) -> AuthResult<AuthSession> {
        let mut state = self.lock()?;
        let identity = state
            .current
            .as_ref()
            .map(|session| session.identity.clone())
            .ok_or_else(|| AuthError::Api("No active session to refresh".to_string()))?;
        let session = Self::issue(&mut state, identity);
        state.current = Some(session.clone());
        Ok(session)
    }

    fn sign_out(&self) -> AuthResult<()> {
        self.lock()?.current = None;
        Ok(())
    }

    fn current_session(&self) -> Option<AuthSession> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_handle_is_registered_on_first_sign_in() {
        let provider = MemoryIdentityProvider::new();
        let first = provider
            .sign_in(Credentials::handle("mina", "secret1"))
            .await
            .unwrap();
        provider.sign_out().unwrap();
        let second = provider
            .sign_in(Credentials::handle("mina", "secret1"))
            .await
            .unwrap();

        assert_eq!(first.identity.uid, second.identity.uid);
        assert_eq!(provider.current_handle().as_deref(), Some("mina"));
    }

    #[tokio::test]
    async fn wrong_and_weak_secrets_are_distinct_errors() {
        let provider = MemoryIdentityProvider::with_account("mina", "secret1").unwrap();

        let wrong = provider
            .sign_in(Credentials::handle("mina", "secret2"))
            .await;
        assert!(matches!(wrong, Err(AuthError::WrongCredential)));

        let weak = provider.sign_in(Credentials::handle("jun", "123")).await;
        assert!(matches!(weak, Err(AuthError::WeakSecret(_))));
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn refresh_issues_new_token_for_same_identity() {
        let provider = MemoryIdentityProvider::new();
        let session = provider
            .sign_in(Credentials::google("token-a"))
            .await
            .unwrap();
        let refreshed = provider.refresh_session().await.unwrap();

        assert_ne!(session.id_token, refreshed.id_token);
        assert_eq!(session.identity, refreshed.identity);
        assert_eq!(provider.current_handle(), None);
    }
}
