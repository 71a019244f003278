//! Sync coordinator: decides when local changes are pushed to the remote
//! mirror and applies remote snapshots locally without echoing them back.
//!
//! The local store stays authoritative. Pushes always send a whole
//! collection; at most one push per collection runs at a time and changes
//! made meanwhile are folded into a single follow-up push.

mod state;

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::auth::{AuthError, AuthSession, Credentials, Identity, IdentityProvider};
use crate::db::{ChangeListener, LocalStore};
use crate::error::Error;
use crate::mirror::{MirrorError, RemoteMirror, RemoteScope, SnapshotHandler, Subscription};
use crate::models::{Collection, Document};

pub use state::{PushDecision, SyncPhase, SyncState, SyncStatus};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sign in to use cloud sync.")]
    Unauthenticated,
    #[error("Cloud is unreachable: {0}")]
    RemoteUnavailable(#[source] MirrorError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] Error),
    #[error("Initial sync failed: {source}")]
    Reconciliation {
        #[source]
        source: Box<SyncError>,
    },
}

impl From<MirrorError> for SyncError {
    fn from(error: MirrorError) -> Self {
        match error {
            MirrorError::Unauthenticated => Self::Unauthenticated,
            other => Self::RemoteUnavailable(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// How local and remote data are brought together right after sign-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Replace local collections with the remote ones
    Pull,
    /// Overwrite remote collections with the local ones
    Push,
    None,
}

impl Reconciliation {
    /// Pull when the user asked for it, else push if there is local data worth keeping.
    #[must_use]
    pub const fn from_prompt(pull_confirmed: bool, has_local_entries: bool) -> Self {
        if pull_confirmed {
            Self::Pull
        } else if has_local_entries {
            Self::Push
        } else {
            Self::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Attach a remote listener per collection after sign-in
    pub live_updates: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { live_updates: true }
    }
}

pub struct SyncCoordinator<M: RemoteMirror, P: IdentityProvider> {
    inner: Arc<Inner<M, P>>,
}

impl<M: RemoteMirror, P: IdentityProvider> Clone for SyncCoordinator<M, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<M: RemoteMirror, P: IdentityProvider> {
    store: Arc<LocalStore>,
    mirror: M,
    identity: P,
    options: SyncOptions,
    runtime: Option<Handle>,
    state: Mutex<SyncState>,
    scope: Mutex<Option<RemoteScope>>,
    subscriptions: Mutex<Vec<Subscription>>,
    /// Latest remote snapshot per collection that arrived during a push
    deferred: Mutex<[Option<Vec<Document>>; 3]>,
    idle: Notify,
}

/// Push slots held by a manual transfer, released on drop.
struct ClaimedSlots<M: RemoteMirror, P: IdentityProvider> {
    inner: Arc<Inner<M, P>>,
    collections: Vec<Collection>,
    /// Apply snapshots held back while the slots were taken
    replay_deferred: bool,
}

impl<M: RemoteMirror, P: IdentityProvider> Drop for ClaimedSlots<M, P> {
    fn drop(&mut self) {
        for &collection in &self.collections {
            if self.inner.end_push(collection, self.replay_deferred) {
                Inner::spawn_push(&self.inner, collection);
            }
        }
        self.inner.idle.notify_waiters();
    }
}

/// Forwards store notifications without keeping the coordinator alive.
struct StoreListener<M: RemoteMirror, P: IdentityProvider> {
    inner: Weak<Inner<M, P>>,
}

impl<M: RemoteMirror, P: IdentityProvider> ChangeListener for StoreListener<M, P> {
    fn collection_changed(&self, collection: Collection) {
        if let Some(inner) = self.inner.upgrade() {
            Inner::on_local_change(&inner, collection);
        }
    }
}

impl<M: RemoteMirror, P: IdentityProvider> SyncCoordinator<M, P> {
    /// Create a coordinator and register it as the store's change listener.
    ///
    /// Pushes are spawned on the Tokio runtime current at construction.
    pub fn new(store: Arc<LocalStore>, mirror: M, identity: P, options: SyncOptions) -> Self {
        let inner = Arc::new(Inner {
            store: Arc::clone(&store),
            mirror,
            identity,
            options,
            runtime: Handle::try_current().ok(),
            state: Mutex::new(SyncState::default()),
            scope: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            deferred: Mutex::new(Default::default()),
            idle: Notify::new(),
        });
        store.set_change_listener(Arc::new(StoreListener {
            inner: Arc::downgrade(&inner),
        }));
        Self { inner }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    pub fn mirror(&self) -> &M {
        &self.inner.mirror
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.lock_state().status()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.lock_state().phase()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        if !self.inner.lock_state().is_authenticated() {
            return None;
        }
        self.inner.identity.current_identity()
    }

    /// Handle used to stamp authorship on new entries.
    pub fn current_handle(&self) -> Option<String> {
        self.current_identity().and_then(|identity| identity.handle())
    }

    /// Sign in, reconcile with the chosen strategy, then start live updates.
    ///
    /// A failed reconciliation leaves the user signed in but offline.
    pub async fn sign_in(
        &self,
        credentials: Credentials,
        reconciliation: Reconciliation,
    ) -> SyncResult<Identity> {
        let session = self.inner.identity.sign_in(credentials).await?;
        self.establish(session, reconciliation).await
    }

    /// Resume a persisted session, if any.
    pub async fn restore_session(
        &self,
        reconciliation: Reconciliation,
    ) -> SyncResult<Option<Identity>> {
        let Some(session) = self.inner.identity.restore_session().await? else {
            return Ok(None);
        };
        self.establish(session, reconciliation).await.map(Some)
    }

    /// Swap in a fresh id token for every remote call and watcher.
    pub async fn refresh_session(&self) -> SyncResult<()> {
        let session = self.inner.identity.refresh_session().await?;
        if let Some(scope) = self.inner.lock_scope().as_ref() {
            scope.set_token(session.id_token);
        }
        Ok(())
    }

    /// Stop live updates and forget the session. Local data is kept and
    /// pushes already running are left to finish.
    pub fn sign_out(&self) -> SyncResult<()> {
        self.detach_listeners();
        *self.inner.lock_scope() = None;
        self.inner.lock_state().sign_out();
        self.inner.clear_deferred();
        self.inner.identity.sign_out()?;
        tracing::info!("Signed out; local data kept");
        Ok(())
    }

    /// Record a connectivity change. Nothing missed while offline is replayed.
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock_state().set_connected(connected);
        if connected {
            tracing::info!("Back online");
        } else {
            tracing::info!("Offline; automatic pushes paused");
        }
    }

    /// Overwrite all three remote collections with the local ones.
    pub async fn force_push(&self) -> SyncResult<()> {
        let scope = self.require_remote()?;
        self.inner.lock_state().begin_manual();
        let result = self.push_all(&scope).await;
        self.inner.lock_state().finish_manual();
        result
    }

    /// Replace all three local collections with the remote ones.
    pub async fn force_pull(&self) -> SyncResult<()> {
        let scope = self.require_remote()?;
        self.inner.lock_state().begin_manual();
        let result = self.pull_all(&scope).await;
        self.inner.lock_state().finish_manual();
        result
    }

    /// Wait until no automatic push is running.
    pub async fn flush(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if !self.inner.lock_state().any_push_in_flight() {
                return;
            }
            notified.await;
        }
    }

    async fn establish(
        &self,
        session: AuthSession,
        reconciliation: Reconciliation,
    ) -> SyncResult<Identity> {
        self.detach_listeners();
        self.inner.clear_deferred();
        let scope = RemoteScope::new(&session.identity.uid, &session.id_token);
        *self.inner.lock_scope() = Some(scope.clone());
        self.inner.lock_state().begin_reconciling();
        tracing::info!(
            "Signed in as {}; reconciling ({:?})",
            session.identity.uid,
            reconciliation
        );

        let reconciled = match reconciliation {
            Reconciliation::Pull => self.pull_all(&scope).await,
            Reconciliation::Push => self.push_all(&scope).await,
            Reconciliation::None => Ok(()),
        };
        if let Err(source) = reconciled {
            let mut state = self.inner.lock_state();
            state.finish_reconciling();
            state.set_connected(false);
            drop(state);
            return Err(SyncError::Reconciliation {
                source: Box::new(source),
            });
        }

        if self.inner.options.live_updates {
            self.attach_listeners(&scope);
        }
        self.inner.lock_state().finish_reconciling();
        tracing::info!("Sync ready: {}", self.status());
        Ok(session.identity)
    }

    /// Overwrite each remote collection in turn, waiting for any automatic
    /// push of it to finish first.
    async fn push_all(&self, scope: &RemoteScope) -> SyncResult<()> {
        for collection in Collection::ALL {
            let mut slot = self.claim(&[collection]).await;
            let records = self.inner.store.get(collection)?;
            tracing::debug!("Pushing {} {} record(s)", records.len(), collection);
            self.inner
                .mirror
                .overwrite_all(scope, collection, records)
                .await?;
            slot.replay_deferred = false;
        }
        Ok(())
    }

    /// Fetch all three collections before touching any local data.
    ///
    /// No push runs while the pull holds the collections.
    async fn pull_all(&self, scope: &RemoteScope) -> SyncResult<()> {
        let _slots = self.claim(&Collection::ALL).await;
        let mut fetched = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            fetched.push((
                collection,
                self.inner.mirror.fetch_all(scope, collection).await?,
            ));
        }

        for (collection, records) in fetched {
            tracing::debug!("Pulled {} {} record(s)", records.len(), collection);
            self.inner.replace_from_remote(collection, records)?;
        }
        Ok(())
    }

    /// Take the push slot of each collection, in order, waiting while an
    /// automatic push holds one.
    async fn claim(&self, collections: &[Collection]) -> ClaimedSlots<M, P> {
        let mut slots = ClaimedSlots {
            inner: Arc::clone(&self.inner),
            collections: Vec::with_capacity(collections.len()),
            replay_deferred: true,
        };
        for &collection in collections {
            loop {
                let mut notified = pin!(self.inner.idle.notified());
                notified.as_mut().enable();
                if self.inner.lock_state().try_claim(collection) {
                    break;
                }
                notified.await;
            }
            slots.collections.push(collection);
        }
        slots
    }

    fn require_remote(&self) -> SyncResult<RemoteScope> {
        let state = self.inner.lock_state();
        if !state.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }
        if !state.is_connected() {
            return Err(SyncError::RemoteUnavailable(MirrorError::Offline));
        }
        drop(state);
        self.inner
            .lock_scope()
            .clone()
            .ok_or(SyncError::Unauthenticated)
    }

    fn attach_listeners(&self, scope: &RemoteScope) {
        let mut subscriptions = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let weak = Arc::downgrade(&self.inner);
            let handler: SnapshotHandler = Arc::new(move |records: Vec<Document>| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_remote_snapshot(collection, records);
                }
            });
            match self.inner.mirror.watch(scope, collection, handler) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(error) => {
                    tracing::warn!("Live updates for {} unavailable: {}", collection, error);
                }
            }
        }
        self.inner.lock_subscriptions().extend(subscriptions);
    }

    fn detach_listeners(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.lock_subscriptions());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl<M: RemoteMirror, P: IdentityProvider> Inner<M, P> {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_scope(&self) -> MutexGuard<'_, Option<RemoteScope>> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deferred(&self) -> MutexGuard<'_, [Option<Vec<Document>>; 3]> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_deferred(&self) {
        *self.lock_deferred() = Default::default();
    }

    fn on_local_change(inner: &Arc<Self>, collection: Collection) {
        let decision = inner.lock_state().request_push(collection);
        match decision {
            PushDecision::Echo => {
                tracing::debug!("Not pushing {}: change came from the cloud", collection);
            }
            PushDecision::Skip => {}
            PushDecision::Coalesced => {
                tracing::debug!("Push of {} in flight; follow-up queued", collection);
            }
            PushDecision::Start => Self::spawn_push(inner, collection),
        }
    }

    /// Run the push loop for `collection`, whose slot the caller holds.
    fn spawn_push(inner: &Arc<Self>, collection: Collection) {
        let Some(runtime) = inner.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            tracing::warn!("No async runtime; skipping push of {}", collection);
            while inner.end_push(collection, false) {}
            inner.idle.notify_waiters();
            return;
        };
        let task = Arc::clone(inner);
        runtime.spawn(async move { task.push_loop(collection).await });
    }

    async fn push_loop(self: Arc<Self>, collection: Collection) {
        loop {
            let pushed = match self.push_once(collection).await {
                Ok(count) => {
                    tracing::debug!("Pushed {} {} record(s)", count, collection);
                    true
                }
                Err(error) => {
                    tracing::warn!("Automatic push of {} failed: {}", collection, error);
                    false
                }
            };
            if !self.end_push(collection, !pushed) {
                break;
            }
        }
        self.idle.notify_waiters();
    }

    /// Release the push slot of `collection`. Returns `true` when the slot is
    /// kept for a coalesced follow-up push.
    ///
    /// Otherwise, with `replay_deferred`, a remote snapshot held back while
    /// the slot was taken is applied now.
    fn end_push(&self, collection: Collection, replay_deferred: bool) -> bool {
        let (again, deferred) = {
            let mut state = self.lock_state();
            let again = state.finish_push(collection);
            (again, self.lock_deferred()[collection.index()].take())
        };
        if !again && replay_deferred {
            if let Some(records) = deferred {
                self.apply_remote_snapshot(collection, records);
            }
        }
        again
    }

    /// Send the collection as it is now.
    async fn push_once(&self, collection: Collection) -> SyncResult<usize> {
        let scope = self.lock_scope().clone().ok_or(SyncError::Unauthenticated)?;
        let records = self.store.get(collection)?;
        let count = records.len();
        self.mirror
            .overwrite_all(&scope, collection, records)
            .await?;
        Ok(count)
    }

    /// Replace local `collection` with a remote snapshot.
    ///
    /// While a push of the collection runs, the snapshot is held back: the
    /// push decides what the remote holds. If that push fails, the latest
    /// held-back snapshot is applied once the slot is released.
    fn apply_remote_snapshot(&self, collection: Collection, records: Vec<Document>) {
        {
            let state = self.lock_state();
            if !state.is_authenticated() {
                return;
            }
            if state.push_in_flight(collection) {
                tracing::debug!(
                    "Holding back remote {} snapshot while a push is in flight",
                    collection
                );
                self.lock_deferred()[collection.index()] = Some(records);
                return;
            }
        }

        match self.store.get(collection) {
            Ok(local) if same_records(&local, &records) => return,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!("Reading local {} failed: {}", collection, error);
                return;
            }
        }

        let count = records.len();
        match self.replace_from_remote(collection, records) {
            Ok(()) => tracing::info!("Applied remote {} ({} record(s))", collection, count),
            Err(error) => tracing::warn!("Applying remote {} failed: {}", collection, error),
        }
    }

    /// Replace a local collection without triggering a push of the result.
    fn replace_from_remote(&self, collection: Collection, records: Vec<Document>) -> Result<(), Error> {
        self.lock_state().suppress_next_push(collection);
        let result = self.store.replace(collection, records);
        self.lock_state().clear_suppression(collection);
        result
    }
}

/// Equal as sets of records; remote listings need not keep local order.
fn same_records(local: &[Document], remote: &[Document]) -> bool {
    if local.len() != remote.len() {
        return false;
    }
    let mut local: Vec<&Document> = local.iter().collect();
    let mut remote: Vec<&Document> = remote.iter().collect();
    local.sort_by_key(|document| document.id());
    remote.sort_by_key(|document| document.id());
    local == remote
}
