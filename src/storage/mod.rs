//! Pluggable persistence for metrics history and quota snapshots.
//!
//! [`StorageAdapter`] is implemented by a Redis-backed store when
//! `REDIS_URL` is configured, and by a file-backed store otherwise — the
//! pipeline and metrics core talk only to the trait.

use async_trait::async_trait;

pub mod file;
pub mod memory;
pub mod redis_store;

/// Minimal key/blob persistence used for metrics history snapshots and
/// (optionally) cached quota state across restarts.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
