//! Bounded, TTL-aware LRU cache.
//!
//! A single [`tokio::sync::Mutex`] guards both the map and the recency
//! order, since `get` itself mutates order and may delete expired entries —
//! there is no read/write split here, reads take the same exclusive lock
//! writes do.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct Entry<V> {
    value: V,
    expires_at_nanos: i128,
}

fn now_nanos() -> i128 {
    // Wall-clock nanoseconds since the epoch; monotonic enough for TTL
    // comparisons within a single process lifetime.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i128
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    /// MRU at the back, LRU at the front.
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + std::hash::Hash + Clone, V> Inner<K, V> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &K) {
        self.map.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.map.remove(&oldest);
        }
    }
}

/// A bounded map with absolute-expiry TTL entries and least-recently-used
/// eviction on overflow. Cloning an [`LruCache`] shares the same backing
/// store (it is itself `Arc`-backed internally).
pub struct LruCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sweeper: self.sweeper.clone(),
        }
    }
}

impl<K, V> LruCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Default capacity used when callers don't have an opinion: 1000).
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Sweep interval for the background expiry pass.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Create a new cache bounded to `capacity` entries and spawn its
    /// background sweeper.
    pub fn new(capacity: usize) -> Self {
        let cache = Self {
            inner: Arc::new(Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
            sweeper: Arc::new(Mutex::new(None)),
        };
        cache.spawn_sweeper();
        cache
    }

    fn spawn_sweeper(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Self::SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let mut guard = inner.lock().await;
                let now = now_nanos();
                let expired: Vec<K> = guard
                    .map
                    .iter()
                    .filter(|(_, e)| e.expires_at_nanos <= now)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in expired {
                    guard.remove(&key);
                }
            }
        });
        // spawn() inside an async-free constructor requires a runtime; callers
        // must construct caches from within a tokio context.
        let sweeper = self.sweeper.clone();
        tokio::spawn(async move {
            *sweeper.lock().await = Some(handle);
        });
    }

    /// Returns the cached value for `key`, or `None` if absent or expired.
    /// A hit moves the entry to most-recently-used; an observed-expired
    /// entry is removed inline, so callers never see stale data regardless
    /// of sweeper cadence.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().await;
        let now = now_nanos();
        let expired = match guard.map.get(key) {
            Some(entry) => entry.expires_at_nanos <= now,
            None => return None,
        };
        if expired {
            guard.remove(key);
            return None;
        }
        guard.touch(key);
        guard.map.get(key).map(|e| e.value.clone())
    }

    /// Inserts or replaces `key`. A `ttl` of zero or negative stores an
    /// already-expired entry (accepted, dropped on next access). Replacing
    /// an existing key moves it to most-recently-used. Overflow evicts the
    /// single least-recently-used entry.
    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at_nanos = now_nanos() + ttl.as_nanos() as i128;
        let mut guard = self.inner.lock().await;
        let is_new = !guard.map.contains_key(&key);
        guard.map.insert(
            key.clone(),
            Entry {
                value,
                expires_at_nanos,
            },
        );
        if is_new {
            if guard.map.len() > guard.capacity {
                guard.evict_lru();
            }
            guard.order.push_back(key);
        } else {
            guard.touch(&key);
        }
    }

    /// Current number of live (not necessarily unexpired) entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes a single key, if present.
    pub async fn invalidate(&self, key: &K) {
        self.inner.lock().await.remove(key);
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.map.clear();
        guard.order.clear();
    }

    /// Signals the sweeper to stop. Idempotent — calling it twice, or on a
    /// cache whose sweeper already exited, is a no-op.
    pub async fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_miss_on_absent_key() {
        let cache: LruCache<String, i32> = LruCache::new(2);
        assert_eq!(cache.get(&"x".to_string()).await, None);
    }

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache: LruCache<String, i32> = LruCache::new(2);
        cache
            .set("a".to_string(), 1, Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache: LruCache<String, i32> = LruCache::new(2);
        cache
            .set("a".to_string(), 1, Duration::from_nanos(1))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn overflow_evicts_least_recently_used() {
        let cache: LruCache<String, i32> = LruCache::new(2);
        cache
            .set("a".to_string(), 1, Duration::from_secs(60))
            .await;
        cache
            .set("b".to_string(), 2, Duration::from_secs(60))
            .await;
        // touch "a" so "b" becomes the LRU entry
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        cache
            .set("c".to_string(), 3, Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(&"b".to_string()).await, None);
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
        assert!(cache.len().await <= 2);
    }

    #[tokio::test]
    async fn duplicate_set_replaces_value_and_bound_holds() {
        let cache: LruCache<String, i32> = LruCache::new(2);
        cache
            .set("a".to_string(), 1, Duration::from_secs(60))
            .await;
        cache
            .set("a".to_string(), 2, Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(2));
        assert_eq!(cache.len().await, 1);
    }
}
