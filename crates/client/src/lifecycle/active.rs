//! The active-generation pointer.
//!
//! Requests take a [`GenerationLease`] once and use that generation for
//! every read and write they make. Activation swaps the pointer; leases
//! taken earlier keep naming the old generation and report it as retired.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Notify, RwLock};

#[derive(Debug)]
struct Slot {
    name: Arc<str>,
    consumers: AtomicUsize,
    retired: AtomicBool,
    released: Arc<Notify>,
}

/// Atomic get/swap holder for the generation requests are served from.
#[derive(Debug)]
pub struct ActiveGeneration {
    current: RwLock<Option<Arc<Slot>>>,
    released: Arc<Notify>,
}

impl Default for ActiveGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveGeneration {
    /// A pointer with no active generation.
    pub fn new() -> Self {
        Self { current: RwLock::new(None), released: Arc::new(Notify::new()) }
    }

    /// Name of the active generation.
    pub async fn current(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|slot| slot.name.to_string())
    }

    /// Pin the active generation for the duration of one request.
    pub async fn lease(&self) -> Option<GenerationLease> {
        let current = self.current.read().await;
        current.as_ref().map(|slot| GenerationLease::acquire(slot.clone()))
    }

    /// Make `name` the active generation, returning the one it replaced.
    pub async fn swap(&self, name: &str) -> Option<String> {
        let slot = Arc::new(Slot {
            name: Arc::from(name),
            consumers: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            released: self.released.clone(),
        });

        let previous = self.current.write().await.replace(slot);
        previous.map(|old| {
            old.retired.store(true, Ordering::Release);
            old.name.to_string()
        })
    }

    /// Number of outstanding leases on the active generation.
    pub async fn consumers(&self) -> usize {
        self.current
            .read()
            .await
            .as_ref()
            .map_or(0, |slot| slot.consumers.load(Ordering::Acquire))
    }

    /// Wait until no lease on the active generation is outstanding.
    ///
    /// Returns immediately when nothing is active.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.consumers().await == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A request's hold on one generation.
#[derive(Debug)]
pub struct GenerationLease {
    slot: Arc<Slot>,
}

impl GenerationLease {
    fn acquire(slot: Arc<Slot>) -> Self {
        slot.consumers.fetch_add(1, Ordering::AcqRel);
        Self { slot }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.slot.name.clone()
    }

    /// Whether a newer generation has been activated since the lease was taken.
    pub fn is_retired(&self) -> bool {
        self.slot.retired.load(Ordering::Acquire)
    }
}

impl Clone for GenerationLease {
    fn clone(&self) -> Self {
        Self::acquire(self.slot.clone())
    }
}

impl Drop for GenerationLease {
    fn drop(&mut self) {
        if self.slot.consumers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.slot.released.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_pointer() {
        let active = ActiveGeneration::new();
        assert_eq!(active.current().await, None);
        assert!(active.lease().await.is_none());
        assert_eq!(active.consumers().await, 0);
    }

    #[tokio::test]
    async fn test_swap_returns_previous() {
        let active = ActiveGeneration::new();
        assert_eq!(active.swap("v1").await, None);
        assert_eq!(active.swap("v2").await.as_deref(), Some("v1"));
        assert_eq!(active.current().await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_lease_survives_swap() {
        let active = ActiveGeneration::new();
        active.swap("v1").await;

        let lease = active.lease().await.unwrap();
        active.swap("v2").await;

        assert_eq!(lease.name(), "v1");
        assert!(lease.is_retired());
        assert!(!active.lease().await.unwrap().is_retired());
    }

    #[tokio::test]
    async fn test_consumer_counting() {
        let active = ActiveGeneration::new();
        active.swap("v1").await;

        let a = active.lease().await.unwrap();
        let b = a.clone();
        assert_eq!(active.consumers().await, 2);

        drop(a);
        assert_eq!(active.consumers().await, 1);
        drop(b);
        assert_eq!(active.consumers().await, 0);
    }

    #[tokio::test]
    async fn test_wait_for_idle_blocks_until_release() {
        let active = Arc::new(ActiveGeneration::new());
        active.swap("v1").await;
        let lease = active.lease().await.unwrap();

        let waiter = {
            let active = active.clone();
            tokio::spawn(async move { active.wait_for_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake once the lease is released")
            .unwrap();
    }
}
