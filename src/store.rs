//! # Key-value store
//!
//! All shared state lives in a hosted key-value store reached through the
//! narrow [`KvStore`] surface: `get`, `set`, `incr`, `expire`.
//!
//! ## Requirements
//!
//! - Fast lookups on a small dataset (one list key, one detail key per
//!   registrant, one counter key per source address)
//! - Atomic increments for the rate-limit counters
//! - TTL expiry for the rate-limit counters
//!
//! ## Implementations
//!
//! - [`RedisKvStore`] — production backend over a Redis connection manager
//! - [`MemoryKvStore`] — in-process backend for tests and local runs; honors
//!   expiry against the tokio clock so window tests can run under paused time
//!
//! There is no locking or transaction discipline on top of these four
//! operations; callers that read-modify-write a value do so non-atomically.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(String);

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError(format!("bad stored value: {err}"))
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError>;
}

pub struct RedisKvStore {
    connection: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(RedisKvStore { connection })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set(key, value).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.incr(key, 1).await?)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.expire(key, seconds as i64).await?;
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        // SET discards any previous TTL, as Redis does.
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let (current, expires_at) = match entries.get(key) {
            Some(entry) if !entry.expired(now) => (
                entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| StoreError(format!("non-integer value under {key}")))?,
                entry.expires_at,
            ),
            _ => (0, None),
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if !entry.expired(now) {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
            }
        }
        Ok(())
    }
}
