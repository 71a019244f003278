//! Remote mirror of the three collections, namespaced per user.
//!
//! Remote layout: `users/{uid}/{categories|dictionary|phrases}/{id}`. Every
//! write replaces a whole collection; reads and watch callbacks always carry
//! the full collection.

mod firestore;
mod memory;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::models::{Collection, Document};

pub use firestore::FirestoreMirror;
pub use memory::{MemoryMirror, RecordedPush};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Not signed in; cloud operations need an authenticated session.")]
    Unauthenticated,
    #[error("Cloud service is unreachable.")]
    Offline,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Document store error: {0}")]
    Api(String),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed remote document: {0}")]
    InvalidDocument(String),
    #[error("Live updates need a running async runtime")]
    NoRuntime,
}

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Authenticated namespace for remote calls: the user's id and a bearer token.
///
/// Clones share the token, so refreshing it once updates every holder,
/// watcher tasks included.
#[derive(Clone)]
pub struct RemoteScope {
    user_id: String,
    token: Arc<RwLock<String>>,
}

impl RemoteScope {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: Arc::new(RwLock::new(token.into())),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }

    /// Fail fast when the scope cannot authenticate a request.
    pub fn ensure_authenticated(&self) -> MirrorResult<()> {
        if self.user_id.trim().is_empty() || self.token().trim().is_empty() {
            return Err(MirrorError::Unauthenticated);
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteScope")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Receives the full contents of a collection whenever it changes remotely
pub type SnapshotHandler = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Live listener handle; dropping it also unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A per-user remote copy of the collections.
pub trait RemoteMirror: Send + Sync + 'static {
    /// Delete every remote record of `collection`, then write `records`.
    ///
    /// A failure part-way may leave the remote collection partially written;
    /// the next successful overwrite corrects it.
    fn overwrite_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        records: Vec<Document>,
    ) -> impl Future<Output = MirrorResult<()>> + Send;

    fn fetch_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
    ) -> impl Future<Output = MirrorResult<Vec<Document>>> + Send;

    /// Deliver the current contents of `collection` now and after every remote change.
    fn watch(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        on_change: SnapshotHandler,
    ) -> MirrorResult<Subscription>;
}
