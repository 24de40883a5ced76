//! The three named caches the pipeline consults: translated messages,
//! normalized tool schemas, and account quota snapshots.

use std::time::Duration;

use super::lru::LruCache;

const MESSAGES_TTL: Duration = Duration::from_secs(10 * 60);
const TOOLS_TTL: Duration = Duration::from_secs(30 * 60);
const QUOTA_TTL: Duration = Duration::from_secs(60 * 60);

/// Bundles the messages/tools/quota caches behind one clonable handle.
#[derive(Clone)]
pub struct CacheService {
    messages: LruCache<String, String>,
    tools: LruCache<String, serde_json::Value>,
    quota: LruCache<String, crate::accounts::quota::Quota>,
}

impl CacheService {
    pub fn new() -> Self {
        Self {
            messages: LruCache::new(LruCache::<String, String>::DEFAULT_CAPACITY),
            tools: LruCache::new(LruCache::<String, serde_json::Value>::DEFAULT_CAPACITY),
            quota: LruCache::new(
                LruCache::<String, crate::accounts::quota::Quota>::DEFAULT_CAPACITY,
            ),
        }
    }

    pub async fn get_translated_messages(&self, key: &str) -> Option<String> {
        self.messages.get(&key.to_string()).await
    }

    pub async fn set_translated_messages(&self, key: String, value: String) {
        self.messages.set(key, value, MESSAGES_TTL).await;
    }

    pub async fn get_normalized_tools(&self, key: &str) -> Option<serde_json::Value> {
        self.tools.get(&key.to_string()).await
    }

    pub async fn set_normalized_tools(&self, key: String, value: serde_json::Value) {
        self.tools.set(key, value, TOOLS_TTL).await;
    }

    /// Quota entries are cloned out so the caller may mutate its own copy
    /// without racing other readers of the cached snapshot.
    pub async fn get_quota(&self, key: &str) -> Option<crate::accounts::quota::Quota> {
        self.quota.get(&key.to_string()).await
    }

    pub async fn set_quota(&self, key: String, value: crate::accounts::quota::Quota) {
        self.quota.set(key, value, QUOTA_TTL).await;
    }

    /// Drops every cached quota snapshot, forcing the next lookup per account
    /// to hit the upstream quota endpoint.
    pub async fn clear_quota_cache(&self) {
        self.quota.clear().await;
    }

    /// Drops a single cached quota entry, used when the upstream quota check
    /// comes back unauthorized and the cached snapshot can't be trusted.
    pub async fn invalidate_quota(&self, key: &str) {
        self.quota.invalidate(&key.to_string()).await;
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}
