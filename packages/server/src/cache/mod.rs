//! Read-through cache for Spec detail payloads.
//!
//! Cache failures are never fatal: reads degrade to a miss, writes and
//! invalidations are logged and dropped.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub use memory::{MemoryCache, run_cache_sweeper};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`. Removing a missing key is a no-op.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key for a Spec detail payload.
pub fn spec_cache_key(id: Uuid) -> String {
    format!("spec:{id}")
}

/// Invalidation count of one Spec, observed before reading the data that is
/// about to be cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation(u64);

/// Spec-scoped view over a [`Cache`] that applies the key format, the TTL and
/// the error-swallowing policy.
///
/// Every invalidation bumps a per-Spec generation under a per-Spec lock.
/// Writes made through [`SpecCache::set_if_current`] take the same lock and
/// are dropped when the generation moved, so a payload read before an
/// invalidation never lands after it.
#[derive(Clone)]
pub struct SpecCache {
    inner: Arc<dyn Cache>,
    ttl: Duration,
    generations: Arc<DashMap<Uuid, Arc<Mutex<u64>>>>,
}

impl SpecCache {
    pub fn new(inner: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            generations: Arc::new(DashMap::new()),
        }
    }

    fn slot(&self, id: Uuid) -> Arc<Mutex<u64>> {
        self.generations.entry(id).or_default().clone()
    }

    /// Current generation of `id`. Capture it before loading the payload.
    pub async fn generation(&self, id: Uuid) -> Generation {
        Generation(*self.slot(id).lock().await)
    }

    /// Cached serialized payload, or `None` on miss or backend failure.
    pub async fn get(&self, id: Uuid) -> Option<String> {
        match self.inner.get(&spec_cache_key(id)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(spec_id = %id, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, id: Uuid, payload: String) {
        if let Err(e) = self.inner.set(&spec_cache_key(id), payload, self.ttl).await {
            warn!(spec_id = %id, error = %e, "Cache write failed");
        }
    }

    /// Write `payload` only if `id` was not invalidated since `seen`.
    /// Returns whether the entry was written.
    pub async fn set_if_current(&self, id: Uuid, payload: String, seen: Generation) -> bool {
        let slot = self.slot(id);
        let current = slot.lock().await;
        if *current != seen.0 {
            debug!(spec_id = %id, "Skipping cache write for invalidated payload");
            return false;
        }
        self.set(id, payload).await;
        true
    }

    /// [`SpecCache::set_if_current`] without blocking the caller. The
    /// response may be sent before the entry lands.
    pub fn set_detached(&self, id: Uuid, payload: String, seen: Generation) {
        let cache = self.clone();
        tokio::spawn(async move {
            cache.set_if_current(id, payload, seen).await;
        });
    }

    /// Drop the entry for `id` and reject pending writes of older payloads.
    pub async fn invalidate(&self, id: Uuid) {
        let slot = self.slot(id);
        let mut generation = slot.lock().await;
        *generation += 1;
        if let Err(e) = self.inner.invalidate(&spec_cache_key(id)).await {
            warn!(spec_id = %id, error = %e, "Cache invalidation failed");
        }
    }
}
