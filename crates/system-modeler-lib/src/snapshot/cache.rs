//! Time-bounded in-memory cache for the edge snapshot
//!
//! An entry expires when it has not been read for the sliding window, or when it is older than
//! the absolute window, whichever comes first. Writes to the backing file never invalidate the
//! cache; readers may see the previous snapshot for up to the absolute window.

use crate::Result;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cache key under which the edge snapshot is stored
pub const SNAPSHOT_CACHE_KEY: &str = "models";

/// Expiry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCacheConfig {
    pub key: String,
    /// Idle time after which an entry expires (default 10 s)
    pub sliding_expiration: Duration,
    /// Age after which an entry expires regardless of use (default 60 s)
    pub absolute_expiration: Duration,
}

impl Default for SnapshotCacheConfig {
    fn default() -> Self {
        Self {
            key: SNAPSHOT_CACHE_KEY.to_string(),
            sliding_expiration: Duration::from_secs(10),
            absolute_expiration: Duration::from_secs(60),
        }
    }
}

/// Keyed cache with sliding and absolute expiry, reloading on miss
///
/// Reloads are not coalesced: concurrent misses on the same key each run their loader, and the
/// last one to finish wins.
pub struct SnapshotCache<V> {
    config: SnapshotCacheConfig,
    entries: Cache<String, Arc<V>>,
}

impl<V: Send + Sync + 'static> SnapshotCache<V> {
    pub fn new(config: SnapshotCacheConfig) -> Self {
        let entries = Cache::builder()
            .time_to_idle(config.sliding_expiration)
            .time_to_live(config.absolute_expiration)
            .build();
        Self { config, entries }
    }

    pub fn config(&self) -> &SnapshotCacheConfig {
        &self.config
    }

    /// Cached value for `key` if present and fresh, refreshing its sliding window
    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.get(key).await
    }

    /// Cached value for `key`, running `load` on a miss
    ///
    /// Failed loads are not cached.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        tracing::debug!(key, "Snapshot cache miss, loading");
        let value = Arc::new(load().await?);
        self.entries.insert(key.to_string(), value.clone()).await;
        Ok(value)
    }

    /// Drop the entry for `key`
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl<V: Send + Sync + 'static> Default for SnapshotCache<V> {
    fn default() -> Self {
        Self::new(SnapshotCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn short_lived() -> SnapshotCache<usize> {
        SnapshotCache::new(SnapshotCacheConfig {
            sliding_expiration: Duration::from_millis(300),
            absolute_expiration: Duration::from_millis(1000),
            ..Default::default()
        })
    }

    async fn load_counting(cache: &SnapshotCache<usize>, loads: &AtomicUsize) -> usize {
        let value = cache
            .get_or_load(SNAPSHOT_CACHE_KEY, || async {
                Ok(loads.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await
            .unwrap();
        *value
    }

    #[tokio::test]
    async fn test_hit_within_sliding_window() {
        let cache = short_lived();
        let loads = AtomicUsize::new(0);

        assert_eq!(load_counting(&cache, &loads).await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(load_counting(&cache, &loads).await, 1);
    }

    #[tokio::test]
    async fn test_sliding_expiry_after_idle() {
        let cache = short_lived();
        let loads = AtomicUsize::new(0);

        load_counting(&cache, &loads).await;
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(load_counting(&cache, &loads).await, 2);
    }

    #[tokio::test]
    async fn test_absolute_expiry_despite_frequent_reads() {
        let cache = short_lived();
        let loads = AtomicUsize::new(0);

        load_counting(&cache, &loads).await;
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(load_counting(&cache, &loads).await, 1);
        }
        // Past the absolute window, still read within the sliding one
        while load_counting(&cache, &loads).await == 1 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache: SnapshotCache<usize> = SnapshotCache::default();
        let failed = cache
            .get_or_load("models", || async {
                Err(crate::ModelerError::PersistenceReadFailure("boom".into()))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.get("models").await.is_none());

        let value = cache.get_or_load("models", || async { Ok(7) }).await.unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = SnapshotCache::default();
        let loads = AtomicUsize::new(0);
        load_counting(&cache, &loads).await;
        cache.invalidate(SNAPSHOT_CACHE_KEY).await;
        assert_eq!(load_counting(&cache, &loads).await, 2);
        cache.clear();
        assert!(cache.get(SNAPSHOT_CACHE_KEY).await.is_none());
    }
}
