//! Redis-backed shared cache.
//!
//! Lets several application instances share throttling state. Records are
//! stored as the JSON payload produced by [`SharedEntryStore`], one key per
//! identity.
//!
//! [`SharedEntryStore`]: super::store::SharedEntryStore

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use super::store::SharedCache;
use crate::error::{BruteGuardError, Result};

/// Configuration for the Redis cache.
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Prefix prepended to every key
    pub key_prefix: String,
    /// Optional expiry for stored payloads. Record-level pruning still
    /// applies; this only bounds how long idle identities occupy memory.
    pub ttl: Option<Duration>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "bruteguard:".to_string(),
            ttl: None,
        }
    }
}

/// [`SharedCache`] implementation on top of a Redis connection manager.
pub struct RedisSharedCache {
    connection: ConnectionManager,
    config: RedisCacheConfig,
}

impl std::fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSharedCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisSharedCache {
    /// Connect with the default configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, RedisCacheConfig::default()).await
    }

    /// Connect and verify the server answers `PING`.
    pub async fn connect_with_config(url: &str, config: RedisCacheConfig) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            BruteGuardError::Store(format!("Failed to create Redis client: {}", e))
        })?;

        let mut connection = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create Redis connection manager: {}", e);
            BruteGuardError::Store(format!("Failed to create connection manager: {}", e))
        })?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|e| BruteGuardError::Store(format!("Failed to ping Redis: {}", e)))?;

        debug!(key_prefix = %config.key_prefix, "Connected to Redis shared cache");

        Ok(Self { connection, config })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();

        redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| BruteGuardError::Store(format!("Redis GET error: {}", e)))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);

        if let Some(ttl) = self.config.ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }

        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| BruteGuardError::Store(format!("Redis SET error: {}", e)))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();

        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| BruteGuardError::Store(format!("Redis DEL error: {}", e)))
    }
}
