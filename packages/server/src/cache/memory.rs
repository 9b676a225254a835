use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{Cache, CacheError};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache backed by a concurrent map. Expired entries are dropped
/// lazily on read and in bulk by [`run_cache_sweeper`].
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry and return how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Periodically evict expired entries from `cache`.
pub async fn run_cache_sweeper(cache: Arc<MemoryCache>, interval: Duration) {
    info!(
        interval_secs = interval.as_secs(),
        "Starting cache sweeper"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let evicted = cache.purge_expired();
        if evicted > 0 {
            debug!(evicted, remaining = cache.len(), "Evicted expired cache entries");
        }
    }
}
