//! Time-bounded in-memory cache for upstream payloads.
//!
//! Entries expire once their age reaches the TTL. There is no background
//! sweeper: an expired entry is evicted by the `get` that notices it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// Default time-to-live in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;

/// A cached payload with its insertion time
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(payload: V) -> Self {
        Self {
            payload,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Key/value store with a fixed TTL, safe to share between concurrent
/// fetches. Writes to the same key are last-write-wins.
#[derive(Debug)]
pub struct Cache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> Cache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(self.ttl, now) => {
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        // A concurrent put may have refreshed the key since the read lock was dropped
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(self.ttl, now) {
                return Some(entry.payload.clone());
            }
            entries.remove(key);
            tracing::debug!("Evicted expired cache entry {}", key);
        }
        None
    }

    /// Insert or replace an entry, stamped with the current time.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(key.into(), CacheEntry::new(value));
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_put_and_get() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put("current:Delhi", 42);

        assert_eq!(cache.get("current:Delhi"), Some(42));
        assert_eq!(cache.get("current:Mumbai"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_live_before_ttl() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put("k", "payload");

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k"), Some("payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_at_ttl() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put("k", "payload");

        // Age equal to the TTL already counts as expired
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = Cache::new(Duration::from_secs(10));
        cache.put("a", 1);
        cache.put("b", 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_refreshes_insertion_time() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put("k", 1);

        tokio::time::advance(Duration::from_secs(200)).await;
        cache.put("k", 2);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put("a", 1);
        cache.put("b", 2);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_distinct_keys() {
        let cache = std::sync::Arc::new(Cache::new(Duration::from_secs(300)));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put(format!("key-{}", i), i);
                cache.get(&format!("key-{}", i))
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Some(i));
        }
        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn test_default_ttl() {
        let cache: Cache<u8> = Cache::default();
        assert_eq!(cache.ttl(), Duration::from_secs(DEFAULT_TTL_SECS));
    }
}
