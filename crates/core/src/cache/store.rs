//! The version store seam.
//!
//! Strategies and the lifecycle controller talk to storage through
//! [`VersionStore`], so the SQLite backend can be swapped or wrapped.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::connection::CacheDb;
use super::entries::CacheEntry;
use crate::{CachedResponse, Error, RequestKey};

/// Generation-scoped response storage.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Create the generation's entry set if absent.
    async fn open(&self, generation: &str) -> Result<(), Error>;

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error>;

    /// Replace any entry for `key`, creating the generation if needed.
    async fn put(&self, generation: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error>;

    /// Replace the entry for `key` only if `generation` still exists.
    ///
    /// Returns `false` when the generation is gone; it is never recreated.
    async fn put_if_present(
        &self, generation: &str, key: &RequestKey, response: &CachedResponse,
    ) -> Result<bool, Error>;

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error>;

    /// Irreversibly remove the generation and its entries.
    async fn delete(&self, generation: &str) -> Result<(), Error>;

    /// Generation recorded by the last activation, if any.
    async fn active_marker(&self) -> Result<Option<String>, Error>;

    async fn set_active_marker(&self, generation: &str) -> Result<(), Error>;
}

#[async_trait]
impl VersionStore for CacheDb {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.open_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        self.get_entry(generation, key).await
    }

    async fn put(&self, generation: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        self.put_entry(generation, key, response).await
    }

    async fn put_if_present(
        &self, generation: &str, key: &RequestKey, response: &CachedResponse,
    ) -> Result<bool, Error> {
        self.put_entry_if_present(generation, key, response).await
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        CacheDb::list_generations(self).await
    }

    async fn delete(&self, generation: &str) -> Result<(), Error> {
        let removed = self.delete_generation(generation).await?;
        tracing::debug!(generation, removed, "deleted cache generation");
        Ok(())
    }

    async fn active_marker(&self) -> Result<Option<String>, Error> {
        CacheDb::active_marker(self).await
    }

    async fn set_active_marker(&self, generation: &str) -> Result<(), Error> {
        CacheDb::set_active_marker(self, generation).await
    }
}

/// A handle pinned to one generation.
///
/// Every read and write made through the handle targets the same
/// generation, whatever becomes active in the meantime.
#[derive(Clone)]
pub struct GenerationHandle {
    store: Arc<dyn VersionStore>,
    name: Arc<str>,
}

impl GenerationHandle {
    /// Open (creating if absent) the named generation.
    pub async fn open(store: Arc<dyn VersionStore>, name: &str) -> Result<Self, Error> {
        store.open(name).await?;
        Ok(Self::attach(store, Arc::from(name)))
    }

    /// Wrap an existing generation name without touching storage.
    pub fn attach(store: Arc<dyn VersionStore>, name: Arc<str>) -> Self {
        Self { store, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        self.store.get(&self.name, key).await
    }

    pub async fn put(&self, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        self.store.put(&self.name, key, response).await
    }

    /// Write into the generation unless it has been deleted meanwhile.
    pub async fn put_if_present(&self, key: &RequestKey, response: &CachedResponse) -> Result<bool, Error> {
        self.store.put_if_present(&self.name, key, response).await
    }
}

impl std::fmt::Debug for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHandle").field("name", &self.name).finish()
    }
}
