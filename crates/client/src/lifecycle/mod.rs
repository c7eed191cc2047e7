//! Generation lifecycle: precache on install, take over and purge on activate.
//!
//! A generation moves through
//! `Installing -> Installed -> Activating -> Active -> Superseded`.
//! An install that cannot fetch its whole manifest ends in `Redundant` and
//! leaves nothing behind in the store.

pub mod active;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use precache_core::request::resolve;
use precache_core::{CachedResponse, Error, GenerationHandle, InterceptedRequest, RequestKey, VersionStore};

use crate::fetch::Origin;

pub use active::{ActiveGeneration, GenerationLease};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
    Superseded,
    /// Install failed; the generation was discarded.
    Redundant,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Superseded => "superseded",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub generation: String,
    /// Generation that was active before, if any.
    pub previous: Option<String>,
    /// Generations deleted by the cleanup pass.
    pub purged: Vec<String>,
    /// True when an existing generation was resumed without installing.
    pub restored: bool,
}

/// Drives generations through install and activation.
pub struct LifecycleController {
    store: Arc<dyn VersionStore>,
    origin: Arc<dyn Origin>,
    active: Arc<ActiveGeneration>,
    origin_url: Url,
    manifest: Vec<String>,
    states: Mutex<HashMap<String, LifecycleState>>,
    /// Serializes activation and cleanup.
    transition: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn VersionStore>, origin: Arc<dyn Origin>, active: Arc<ActiveGeneration>, origin_url: Url,
        manifest: Vec<String>,
    ) -> Self {
        Self {
            store,
            origin,
            active,
            origin_url,
            manifest,
            states: Mutex::new(HashMap::new()),
            transition: Mutex::new(()),
        }
    }

    pub fn active(&self) -> &Arc<ActiveGeneration> {
        &self.active
    }

    pub async fn state(&self, generation: &str) -> Option<LifecycleState> {
        self.states.lock().await.get(generation).copied()
    }

    async fn set_state(&self, generation: &str, state: LifecycleState) {
        tracing::info!(generation, state = %state, "lifecycle transition");
        self.states.lock().await.insert(generation.to_string(), state);
    }

    /// Precache every manifest entry into `generation`.
    ///
    /// Succeeds only when every entry was fetched with a 2xx status and
    /// stored. On failure the partial generation is deleted and the
    /// generation is marked [`LifecycleState::Redundant`]. Installing an
    /// already installed or active generation is a no-op.
    pub async fn install(&self, generation: &str) -> Result<(), Error> {
        {
            let mut states = self.states.lock().await;
            match states.get(generation) {
                Some(LifecycleState::Installing) => {
                    return Err(Error::Lifecycle(format!("{generation} is already installing")));
                }
                Some(LifecycleState::Installed | LifecycleState::Activating | LifecycleState::Active) => {
                    tracing::debug!(generation, "already installed");
                    return Ok(());
                }
                _ => {}
            }
            states.insert(generation.to_string(), LifecycleState::Installing);
        }
        tracing::info!(generation, entries = self.manifest.len(), "lifecycle transition: installing");

        match self.precache(generation).await {
            Ok(stored) => {
                tracing::info!(generation, stored, "precache complete");
                self.set_state(generation, LifecycleState::Installed).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(generation, error = %e, "install failed");
                if let Err(cleanup) = self.store.delete(generation).await {
                    tracing::warn!(generation, error = %cleanup, "failed to discard partial generation");
                }
                self.set_state(generation, LifecycleState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn precache(&self, generation: &str) -> Result<usize, Error> {
        let handle = GenerationHandle::open(self.store.clone(), generation).await?;

        let mut tasks = JoinSet::new();
        for path in &self.manifest {
            let url = resolve(&self.origin_url, path)
                .map_err(|e| Error::Precache { path: path.clone(), reason: e.to_string() })?;
            let origin = self.origin.clone();
            let path = path.clone();
            tasks.spawn(async move {
                let request = InterceptedRequest::get(url);
                let result = origin.send(&request).await;
                (path, request.key(), result)
            });
        }

        let mut fetched: Vec<(RequestKey, CachedResponse)> = Vec::with_capacity(self.manifest.len());
        while let Some(joined) = tasks.join_next().await {
            let (path, key, result) = joined.map_err(|e| Error::Lifecycle(format!("precache task failed: {e}")))?;
            let response = result.map_err(|e| Error::Precache { path: path.clone(), reason: e.to_string() })?;
            if !response.is_success() {
                return Err(Error::Precache { path, reason: format!("origin returned status {}", response.status) });
            }
            tracing::debug!(%key, status = response.status, "precached");
            fetched.push((key, response));
        }

        for (key, response) in &fetched {
            handle.put(key, response).await?;
        }
        Ok(fetched.len())
    }

    /// Take over immediately: make an installed generation active and
    /// delete every other generation.
    pub async fn activate(&self, generation: &str) -> Result<ActivationReport, Error> {
        let _transition = self.transition.lock().await;

        match self.state(generation).await {
            Some(LifecycleState::Installed) => {}
            other => {
                let from = other.map_or("unknown", LifecycleState::as_str);
                return Err(Error::Lifecycle(format!("cannot activate {generation} from state {from}")));
            }
        }

        self.take_over(generation, false).await
    }

    /// Activate once every lease on the current generation has been released.
    pub async fn activate_when_idle(&self, generation: &str) -> Result<ActivationReport, Error> {
        let consumers = self.active.consumers().await;
        tracing::info!(generation, consumers, "waiting for consumers to detach");
        self.active.wait_for_idle().await;
        self.activate(generation).await
    }

    /// Bring `generation` into service.
    ///
    /// Resumes without installing when the store says `generation` was the
    /// last one activated. Otherwise installs it, then activates either
    /// immediately (`take_over`) or once the current generation is idle.
    pub async fn deploy(&self, generation: &str, take_over: bool) -> Result<ActivationReport, Error> {
        if self.store.active_marker().await?.as_deref() == Some(generation)
            && self.store.list_generations().await?.contains(generation)
        {
            let _transition = self.transition.lock().await;
            tracing::info!(generation, "resuming previously activated generation");
            return self.take_over(generation, true).await;
        }

        self.install(generation).await?;
        if take_over { self.activate(generation).await } else { self.activate_when_idle(generation).await }
    }

    /// Swap the pointer, record the marker and purge other generations.
    ///
    /// Caller holds the transition lock.
    async fn take_over(&self, generation: &str, restored: bool) -> Result<ActivationReport, Error> {
        self.set_state(generation, LifecycleState::Activating).await;

        let previous = self.active.swap(generation).await;
        if let Some(previous) = previous.as_deref()
            && previous != generation
        {
            self.set_state(previous, LifecycleState::Superseded).await;
        }

        if let Err(e) = self.store.set_active_marker(generation).await {
            tracing::warn!(generation, error = %e, "failed to record active generation");
        }

        let purged = self.purge_except(generation).await;
        self.set_state(generation, LifecycleState::Active).await;

        Ok(ActivationReport { generation: generation.to_string(), previous, purged, restored })
    }

    async fn purge_except(&self, keep: &str) -> Vec<String> {
        let generations = match self.store.list_generations().await {
            Ok(generations) => generations,
            Err(e) => {
                tracing::warn!(error = %e, "could not list generations for cleanup");
                return Vec::new();
            }
        };

        let mut purged = Vec::new();
        for name in generations.into_iter().filter(|name| name != keep) {
            match self.store.delete(&name).await {
                Ok(()) => {
                    tracing::info!(generation = %name, "deleted old generation");
                    purged.push(name);
                }
                Err(e) => tracing::warn!(generation = %name, error = %e, "failed to delete old generation"),
            }
        }
        purged
    }
}
