//! Cache-first and network-first retrieval.
//!
//! ### Cache-first (navigation, precached, static)
//! - Hit: answer from the active generation, no network call.
//! - Miss: fetch, store a 2xx response, return it.
//! - Fetch failure: navigations get the precached root document, everything
//!   else a 503.
//!
//! ### Network-first (live API)
//! - Fetch, write through a 2xx response, return it.
//! - Fetch failure: the last stored copy if there is one, otherwise the
//!   JSON offline payload.
//!
//! Responses are duplicated before they are stored: the caller gets one
//! copy while a spawned task persists the other. Persistence failures are
//! logged and never change the response.

pub mod offline;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use url::Url;

use precache_core::{CachedResponse, Error, GenerationHandle, InterceptedRequest, RequestKey, VersionStore};

use crate::fetch::Origin;
use crate::lifecycle::{ActiveGeneration, GenerationLease};
use crate::route::{RouteClass, RouteTable, Strategy};

pub use offline::{OfflinePayload, offline_api, unavailable};

/// Where the response handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the origin.
    Network,
    /// From the active generation.
    Cache,
    /// A stored copy served because the origin failed.
    Stale,
    /// The precached root document, served for a failed navigation.
    Fallback,
    /// A synthetic 503.
    Offline,
    /// Passed through without touching the store.
    Bypass,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Stale => "stale",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Offline => "offline",
            ResponseSource::Bypass => "bypass",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one intercepted request.
#[derive(Debug)]
pub struct Interception {
    pub class: RouteClass,
    pub source: ResponseSource,
    /// Generation the request was pinned to, if any was active.
    pub generation: Option<String>,
    pub response: CachedResponse,
    persist: Option<JoinHandle<()>>,
}

impl Interception {
    fn new(class: RouteClass, source: ResponseSource, generation: Option<&str>, response: CachedResponse) -> Self {
        Self { class, source, generation: generation.map(str::to_string), response, persist: None }
    }

    fn with_persist(mut self, task: JoinHandle<()>) -> Self {
        self.persist = Some(task);
        self
    }

    /// Wait for the background write started by this request, if any.
    ///
    /// Callers normally drop the outcome and let the write finish on its own.
    pub async fn persisted(&mut self) {
        if let Some(task) = self.persist.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "persist task did not complete");
        }
    }

    pub fn into_response(self) -> CachedResponse {
        self.response
    }
}

/// Routes each request to its strategy and runs it against the active generation.
pub struct Interceptor {
    store: Arc<dyn VersionStore>,
    origin: Arc<dyn Origin>,
    active: Arc<ActiveGeneration>,
    routes: RouteTable,
    root_document: Url,
}

impl Interceptor {
    pub fn new(
        store: Arc<dyn VersionStore>, origin: Arc<dyn Origin>, active: Arc<ActiveGeneration>, routes: RouteTable,
        root_document: Url,
    ) -> Self {
        Self { store, origin, active, routes, root_document }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request. Never fails: every failure degrades to a response.
    pub async fn handle(&self, request: InterceptedRequest) -> Interception {
        let class = self.routes.classify(&request);
        let Some(strategy) = class.strategy() else {
            return self.pass_through(class, &request).await;
        };

        let Some(lease) = self.active.lease().await else {
            tracing::debug!(url = %request.url, %class, "no active generation, serving from network");
            return self.network_only(class, &request).await;
        };

        match strategy {
            Strategy::CacheFirst => self.cache_first(class, &request, lease).await,
            Strategy::NetworkFirst => self.network_first(class, &request, lease).await,
        }
    }

    async fn cache_first(&self, class: RouteClass, request: &InterceptedRequest, lease: GenerationLease) -> Interception {
        let generation = GenerationHandle::attach(self.store.clone(), lease.shared_name());
        let key = request.key();

        match generation.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!(%key, generation = generation.name(), %class, "cache hit");
                return Interception::new(class, ResponseSource::Cache, Some(generation.name()), entry.response);
            }
            Ok(None) => tracing::debug!(%key, generation = generation.name(), %class, "cache miss"),
            Err(e) => tracing::warn!(%key, error = %e, "cache read failed, treating as miss"),
        }

        match self.fetch(request).await {
            Ok(response) => {
                let task = persist(lease, generation.clone(), key, response.clone());
                Interception::new(class, ResponseSource::Network, Some(generation.name()), response).with_persist(task)
            }
            Err(e) => {
                tracing::debug!(%key, error = %e, %class, "origin failed on cache miss");
                self.cache_first_fallback(class, &generation).await
            }
        }
    }

    async fn cache_first_fallback(&self, class: RouteClass, generation: &GenerationHandle) -> Interception {
        if class == RouteClass::Navigation {
            let root = RequestKey::new("GET", &self.root_document);
            match generation.get(&root).await {
                Ok(Some(entry)) => {
                    return Interception::new(class, ResponseSource::Fallback, Some(generation.name()), entry.response);
                }
                Ok(None) => {
                    tracing::warn!(key = %root, generation = generation.name(), "root document missing from generation")
                }
                Err(e) => tracing::warn!(key = %root, error = %e, "root document lookup failed"),
            }
        }

        Interception::new(class, ResponseSource::Offline, Some(generation.name()), unavailable())
    }

    async fn network_first(
        &self, class: RouteClass, request: &InterceptedRequest, lease: GenerationLease,
    ) -> Interception {
        let generation = GenerationHandle::attach(self.store.clone(), lease.shared_name());
        let key = request.key();

        let error = match self.fetch(request).await {
            Ok(response) => {
                let task = persist(lease, generation.clone(), key, response.clone());
                return Interception::new(class, ResponseSource::Network, Some(generation.name()), response)
                    .with_persist(task);
            }
            Err(e) => e,
        };

        match generation.get(&key).await {
            Ok(Some(entry)) => {
                tracing::info!(%key, error = %error, stored_at = %entry.stored_at, "origin failed, serving stale copy");
                Interception::new(class, ResponseSource::Stale, Some(generation.name()), entry.response)
            }
            Ok(None) => {
                tracing::info!(%key, error = %error, "origin failed and nothing is cached");
                Interception::new(class, ResponseSource::Offline, Some(generation.name()), offline_api())
            }
            Err(e) => {
                tracing::warn!(%key, error = %error, read_error = %e, "origin failed and cache read failed");
                Interception::new(class, ResponseSource::Offline, Some(generation.name()), offline_api())
            }
        }
    }

    /// Cache-eligible request while no generation is active.
    async fn network_only(&self, class: RouteClass, request: &InterceptedRequest) -> Interception {
        match self.fetch(request).await {
            Ok(response) => Interception::new(class, ResponseSource::Network, None, response),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "origin failed with no active generation");
                let response = if class == RouteClass::LiveApi { offline_api() } else { unavailable() };
                Interception::new(class, ResponseSource::Offline, None, response)
            }
        }
    }

    /// Unhandled requests go to the origin as-is, whatever status it returns.
    async fn pass_through(&self, class: RouteClass, request: &InterceptedRequest) -> Interception {
        match self.origin.send(request).await {
            Ok(response) => Interception::new(class, ResponseSource::Bypass, None, response),
            Err(e) => {
                tracing::warn!(method = %request.method, url = %request.url, error = %e, "pass-through request failed");
                Interception::new(class, ResponseSource::Offline, None, unavailable())
            }
        }
    }

    /// Send to the origin, folding non-2xx answers into the failure branch.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        let response = self.origin.send(request).await.inspect_err(|e| {
            if !e.is_fetch_failure() {
                tracing::warn!(url = %request.url, error = %e, "request could not be sent to origin");
            }
        })?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(Error::Origin { status: response.status, url: request.url.to_string() })
        }
    }
}

/// Write `response` into the leased generation on a background task.
fn persist(
    lease: GenerationLease, generation: GenerationHandle, key: RequestKey, response: CachedResponse,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if lease.is_retired() {
            tracing::debug!(%key, generation = generation.name(), "generation superseded, skipping write");
            return;
        }
        match generation.put_if_present(&key, &response).await {
            Ok(true) => tracing::debug!(%key, generation = generation.name(), "stored response"),
            Ok(false) => tracing::debug!(%key, generation = generation.name(), "generation purged, skipping write"),
            Err(e) => {
                let error = Error::Persist(e.to_string());
                tracing::warn!(%key, generation = generation.name(), %error, "failed to persist response");
            }
        }
        drop(lease);
    })
}
