//! Redis-backed storage adapter, used when `REDIS_URL` is configured
//!. Keeps one shared [`redis::aio::ConnectionManager`] so every call
//! reuses the same multiplexed connection.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{StorageAdapter, StorageError};

pub struct RedisStorage {
    conn: ConnectionManager,
}

impl RedisStorage {
    pub async fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url).map_err(StorageError::Redis)?;
        let conn = client.get_connection_manager().await.map_err(StorageError::Redis)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageAdapter for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
