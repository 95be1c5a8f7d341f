//! Redis cache module for the studio platform
//!
//! This module provides functionality for connecting to Redis and performing
//! basic cache operations like get and set with TTL support, plus the
//! short-lived locks the scheduler uses to run each job on one instance only.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Ok(RedisConfig { url })
    }
}

/// Prefix of the keys marking revoked JWTs
pub const REVOKED_TOKEN_PREFIX: &str = "blacklisted_token:";

/// Key under which a revoked token is remembered until it expires
pub fn revoked_token_key(token: &str) -> String {
    format!("{}{}", REVOKED_TOKEN_PREFIX, token)
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Try to take a lock held under `key` for at most `ttl_seconds`
    ///
    /// Returns `true` when this caller now owns the lock. The lock is released
    /// by [`RedisPool::release_lock`] or when the TTL runs out.
    pub async fn try_lock(&self, key: &str, owner: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        let acquired = reply.as_deref() == Some("OK");
        debug!("Lock {} acquired by {}: {}", key, owner, acquired);
        Ok(acquired)
    }

    /// Release a lock, but only if `owner` still holds it
    pub async fn release_lock(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
            "#,
        );
        let released: i64 = script.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(released == 1)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn local_pool() -> Result<RedisPool> {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
        };
        RedisPool::new(&config).await
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_redis_connection() -> Result<()> {
        let pool = local_pool().await?;
        assert!(pool.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_set_get_delete() -> Result<()> {
        let pool = local_pool().await?;

        let key = "test_key";
        let value = "test_value";
        pool.set(key, value, Some(5)).await?;

        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, Some(value.to_string()));

        pool.delete(key).await?;
        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_lock_is_exclusive_until_released() -> Result<()> {
        let pool = local_pool().await?;
        let key = "test_lock_key";
        pool.delete(key).await?;

        assert!(pool.try_lock(key, "first", 10).await?);
        assert!(!pool.try_lock(key, "second", 10).await?);

        // Only the owner can release it
        assert!(!pool.release_lock(key, "second").await?);
        assert!(pool.release_lock(key, "first").await?);
        assert!(pool.try_lock(key, "second", 10).await?);

        pool.delete(key).await?;
        Ok(())
    }

    #[test]
    fn test_revoked_token_key() {
        assert_eq!(revoked_token_key("abc.def"), "blacklisted_token:abc.def");
    }

    #[tokio::test]
    async fn test_client_rejects_malformed_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
        };
        assert!(RedisPool::new(&config).await.is_err());
    }
}
