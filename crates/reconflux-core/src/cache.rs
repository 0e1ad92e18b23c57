//! In-memory cache of source results keyed by `(source, target)`.
//!
//! Expiry is enforced on read only: an expired entry is removed the first time
//! it is looked up. There is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::SourceId;

/// Default time-to-live of cached results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    inserted_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<(SourceId, String), CacheEntry>,
    ttl: Duration,
}

impl CacheInner {
    fn get(&mut self, key: &(SourceId, String)) -> Option<Value> {
        let entry = self.map.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            return Some(entry.payload.clone());
        }
        self.map.remove(key);
        None
    }
}

/// Thread-safe result cache with a TTL fixed at construction.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<CacheInner>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                ttl,
            }),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Cached payload for `(source, target)` if it is younger than the TTL.
    ///
    /// An expired entry is evicted and reported as a miss.
    pub fn get(&self, source: SourceId, target: &str) -> Option<Value> {
        self.lock().get(&(source, target.to_owned()))
    }

    /// Store `payload`, replacing any previous entry and restarting its TTL.
    pub fn put(&self, source: SourceId, target: &str, payload: Value) {
        let mut inner = self.lock();
        if inner.ttl.is_zero() {
            return;
        }
        inner.map.insert(
            (source, target.to_owned()),
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.lock().ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl().is_zero()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().expect("result cache lock is not poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_within_ttl_and_evicted_after() {
        let cache = ResultCache::new(Duration::from_secs(3_600));
        cache.put(SourceId::Shodan, "1.2.3.4", json!({ "ports": [22] }));

        tokio::time::advance(Duration::from_secs(3_599)).await;
        assert_eq!(
            cache.get(SourceId::Shodan, "1.2.3.4"),
            Some(json!({ "ports": [22] }))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(SourceId::Shodan, "1.2.3.4"), None);
        assert!(cache.is_empty(), "expired entry is removed on read");

        cache.put(SourceId::Shodan, "1.2.3.4", json!({ "ports": [443] }));
        tokio::time::advance(Duration::from_secs(3_599)).await;
        assert_eq!(
            cache.get(SourceId::Shodan, "1.2.3.4"),
            Some(json!({ "ports": [443] }))
        );
    }

    #[test]
    fn keys_include_source_and_target() {
        let cache = ResultCache::default();
        cache.put(SourceId::Shodan, "example.com", json!(1));

        assert_eq!(cache.get(SourceId::Censys, "example.com"), None);
        assert_eq!(cache.get(SourceId::Shodan, "example.org"), None);
        assert_eq!(cache.get(SourceId::Shodan, "example.com"), Some(json!(1)));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ResultCache::disabled();
        cache.put(SourceId::Whois, "example.com", json!({}));

        assert!(cache.is_disabled());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn expired_entries_stay_counted_until_read() {
        let cache = ResultCache::new(Duration::from_nanos(1));
        cache.put(SourceId::Crtsh, "a.example", json!([]));
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(SourceId::Crtsh, "a.example"), None);
        assert_eq!(cache.len(), 0);
    }
}
