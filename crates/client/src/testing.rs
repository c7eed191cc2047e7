//! Test doubles shared by the strategy and lifecycle tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use async_trait::async_trait;
use precache_core::{CacheDb, CacheEntry, CachedResponse, Error, InterceptedRequest, RequestKey, VersionStore};

use crate::fetch::Origin;

/// An origin that answers from a fixed table keyed by URL path.
///
/// Unknown paths fail at the transport layer.
#[derive(Default)]
pub(crate) struct ScriptedOrigin {
    replies: Mutex<HashMap<String, CachedResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOrigin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, path: &str, response: CachedResponse) {
        self.replies.lock().unwrap().insert(path.to_string(), response);
    }

    /// Make `path` unreachable again.
    pub(crate) fn fail(&self, path: &str) {
        self.replies.lock().unwrap().remove(path);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait]
impl Origin for ScriptedOrigin {
    async fn send(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());
        self.replies
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("connection refused: {}", request.url)))
    }
}

/// A store whose writes always fail.
pub(crate) struct ReadOnlyStore {
    inner: CacheDb,
    pub(crate) attempted_writes: AtomicUsize,
}

impl ReadOnlyStore {
    pub(crate) fn new(inner: CacheDb) -> Self {
        Self { inner, attempted_writes: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl VersionStore for ReadOnlyStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        self.inner.get_entry(generation, key).await
    }

    async fn put(&self, _generation: &str, _key: &RequestKey, _response: &CachedResponse) -> Result<(), Error> {
        self.attempted_writes.fetch_add(1, Ordering::SeqCst);
        Err(Error::Persist("disk I/O error".into()))
    }

    async fn put_if_present(
        &self, _generation: &str, _key: &RequestKey, _response: &CachedResponse,
    ) -> Result<bool, Error> {
        self.attempted_writes.fetch_add(1, Ordering::SeqCst);
        Err(Error::Persist("disk I/O error".into()))
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.inner.list_generations().await
    }

    async fn delete(&self, generation: &str) -> Result<(), Error> {
        self.inner.delete_generation(generation).await.map(|_| ())
    }

    async fn active_marker(&self) -> Result<Option<String>, Error> {
        self.inner.active_marker().await
    }

    async fn set_active_marker(&self, generation: &str) -> Result<(), Error> {
        self.inner.set_active_marker(generation).await
    }
}

/// A store that parks request-time writes until released.
///
/// `entered` fires once a write is parked; `release` lets it proceed.
pub(crate) struct GatedStore {
    inner: CacheDb,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl GatedStore {
    pub(crate) fn new(inner: CacheDb) -> Self {
        Self { inner, entered: Notify::new(), release: Notify::new() }
    }
}

#[async_trait]
impl VersionStore for GatedStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        self.inner.get_entry(generation, key).await
    }

    async fn put(&self, generation: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        self.inner.put_entry(generation, key, response).await
    }

    async fn put_if_present(
        &self, generation: &str, key: &RequestKey, response: &CachedResponse,
    ) -> Result<bool, Error> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.put_entry_if_present(generation, key, response).await
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.inner.list_generations().await
    }

    async fn delete(&self, generation: &str) -> Result<(), Error> {
        self.inner.delete_generation(generation).await.map(|_| ())
    }

    async fn active_marker(&self) -> Result<Option<String>, Error> {
        self.inner.active_marker().await
    }

    async fn set_active_marker(&self, generation: &str) -> Result<(), Error> {
        self.inner.set_active_marker(generation).await
    }
}
