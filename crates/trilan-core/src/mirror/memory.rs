//! In-process remote mirror for tests and offline demos.
//!
//! Watchers are called synchronously: once with the current contents when
//! registered, then after every overwrite or injected change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use super::{MirrorError, MirrorResult, RemoteMirror, RemoteScope, SnapshotHandler, Subscription};
use crate::models::{Collection, Document};

type Key = (String, Collection);

/// One `overwrite_all` call as the mirror received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPush {
    pub user_id: String,
    pub collection: Collection,
    pub records: Vec<Document>,
}

#[derive(Default)]
struct State {
    data: HashMap<Key, Vec<Document>>,
    pushes: Vec<RecordedPush>,
    fetches: usize,
    watchers: HashMap<u64, (Key, SnapshotHandler)>,
    next_watcher: u64,
}

struct Shared {
    state: Mutex<State>,
    available: AtomicBool,
    holding: AtomicBool,
    gate: Semaphore,
    waiting: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryMirror {
    shared: Arc<Shared>,
}

impl Default for MemoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                available: AtomicBool::new(true),
                holding: AtomicBool::new(false),
                gate: Semaphore::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    /// Make every call fail with [`MirrorError::Offline`] until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Park each subsequent `overwrite_all` until [`Self::release_push`] is called.
    pub fn hold_pushes(&self) {
        self.shared.holding.store(true, Ordering::SeqCst);
    }

    /// Let one parked push continue.
    pub fn release_push(&self) {
        self.shared.gate.add_permits(1);
    }

    /// Stop parking pushes and let every parked push continue.
    pub fn release_all(&self) {
        self.shared.holding.store(false, Ordering::SeqCst);
        self.shared
            .gate
            .add_permits(self.shared.waiting.load(Ordering::SeqCst) + 1);
    }

    /// Number of pushes currently parked.
    pub fn parked_pushes(&self) -> usize {
        self.shared.waiting.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.lock().pushes.clone()
    }

    pub fn pushes_for(&self, collection: Collection) -> Vec<RecordedPush> {
        self.lock()
            .pushes
            .iter()
            .filter(|push| push.collection == collection)
            .cloned()
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Total mirror calls: pushes plus fetches.
    pub fn call_count(&self) -> usize {
        let state = self.lock();
        state.pushes.len() + state.fetches
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Remote contents for `user_id`, without counting as a fetch.
    pub fn contents(&self, user_id: &str, collection: Collection) -> Vec<Document> {
        self.lock()
            .data
            .get(&(user_id.to_string(), collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Seed remote contents without notifying watchers.
    pub fn seed(&self, user_id: &str, collection: Collection, records: Vec<Document>) {
        self.lock()
            .data
            .insert((user_id.to_string(), collection), records);
    }

    /// Simulate a change made by another session.
    pub fn inject_remote_change(&self, user_id: &str, collection: Collection, records: Vec<Document>) {
        let key = (user_id.to_string(), collection);
        self.lock().data.insert(key.clone(), records.clone());
        self.notify(&key, &records);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> MirrorResult<()> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MirrorError::Offline)
        }
    }

    fn notify(&self, key: &Key, records: &[Document]) {
        let handlers: Vec<SnapshotHandler> = self
            .lock()
            .watchers
            .values()
            .filter(|(watched, _)| watched == key)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(records.to_vec());
        }
    }

    async fn wait_at_gate(&self) -> MirrorResult<()> {
        if !self.shared.holding.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.shared.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = self.shared.gate.acquire().await;
        self.shared.waiting.fetch_sub(1, Ordering::SeqCst);

        permit
            .map(tokio::sync::SemaphorePermit::forget)
            .map_err(|_| MirrorError::Offline)
    }
}

impl RemoteMirror for MemoryMirror {
    async fn overwrite_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        records: Vec<Document>,
    ) -> MirrorResult<()> {
        scope.ensure_authenticated()?;
        self.ensure_available()?;

        self.lock().pushes.push(RecordedPush {
            user_id: scope.user_id().to_string(),
            collection,
            records: records.clone(),
        });
        self.wait_at_gate().await?;
        self.ensure_available()?;

        let key = (scope.user_id().to_string(), collection);
        self.lock().data.insert(key.clone(), records.clone());
        self.notify(&key, &records);
        Ok(())
    }

    async fn fetch_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
    ) -> MirrorResult<Vec<Document>> {
        scope.ensure_authenticated()?;
        self.ensure_available()?;

        let mut state = self.lock();
        state.fetches += 1;
        Ok(state
            .data
            .get(&(scope.user_id().to_string(), collection))
            .cloned()
            .unwrap_or_default())
    }

    fn watch(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        on_change: SnapshotHandler,
    ) -> MirrorResult<Subscription> {
        scope.ensure_authenticated()?;
        self.ensure_available()?;

        let key = (scope.user_id().to_string(), collection);
        let (id, current) = {
            let mut state = self.lock();
            let id = state.next_watcher;
            state.next_watcher += 1;
            state
                .watchers
                .insert(id, (key.clone(), Arc::clone(&on_change)));
            (id, state.data.get(&key).cloned().unwrap_or_default())
        };
        on_change(current);

        let shared = Arc::downgrade(&self.shared);
        Ok(Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .watchers
                    .remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn scope() -> RemoteScope {
        RemoteScope::new("uid-1", "token")
    }

    fn docs(value: serde_json::Value) -> Vec<Document> {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn overwrite_replaces_and_notifies_watchers() {
        let mirror = MemoryMirror::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = mirror
            .watch(
                &scope(),
                Collection::Dictionary,
                Arc::new(move |records: Vec<Document>| sink.lock().unwrap().push(records.len())),
            )
            .unwrap();

        mirror
            .overwrite_all(&scope(), Collection::Dictionary, docs(json!([{"id": 1}, {"id": 2}])))
            .await
            .unwrap();
        mirror
            .overwrite_all(&scope(), Collection::Phrases, docs(json!([{"id": 3}])))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 2]);
        assert_eq!(
            mirror.fetch_all(&scope(), Collection::Dictionary).await.unwrap(),
            docs(json!([{"id": 1}, {"id": 2}]))
        );

        subscription.unsubscribe();
        assert_eq!(mirror.watcher_count(), 0);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let mirror = MemoryMirror::new();
        mirror
            .overwrite_all(&scope(), Collection::Phrases, docs(json!([{"id": 1}])))
            .await
            .unwrap();

        let other = RemoteScope::new("uid-2", "token");
        assert!(mirror
            .fetch_all(&other, Collection::Phrases)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unavailable_mirror_fails_every_call() {
        let mirror = MemoryMirror::new();
        mirror.set_available(false);

        assert!(matches!(
            mirror.fetch_all(&scope(), Collection::Categories).await,
            Err(MirrorError::Offline)
        ));
        assert!(matches!(
            mirror
                .overwrite_all(&scope(), Collection::Categories, Vec::new())
                .await,
            Err(MirrorError::Offline)
        ));
        assert_eq!(mirror.call_count(), 0);
    }

    #[tokio::test]
    async fn held_push_waits_for_release() {
        let mirror = MemoryMirror::new();
        mirror.hold_pushes();

        let background = mirror.clone();
        let push = tokio::spawn(async move {
            background
                .overwrite_all(&scope(), Collection::Dictionary, docs(json!([{"id": 1}])))
                .await
        });

        while mirror.parked_pushes() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(mirror.contents("uid-1", Collection::Dictionary).is_empty());

        mirror.release_push();
        push.await.unwrap().unwrap();
        assert_eq!(mirror.contents("uid-1", Collection::Dictionary).len(), 1);
    }
}
