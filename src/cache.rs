//! Redis-backed [`CounterCache`] for lockout and one-time-code counters.

use anyhow::Context;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use crate::auth::error::AuthError;
use crate::auth::store::CounterCache;

#[derive(Clone)]
pub struct RedisCounterCache {
    pool: Pool,
}

impl RedisCounterCache {
    /// Build a pool from a `redis://` URL.
    ///
    /// # Errors
    /// Returns an error when the pool cannot be created.
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .context("failed to create redis pool")?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, AuthError> {
        self.pool
            .get()
            .await
            .context("failed to get redis connection")
            .map_err(AuthError::Internal)
    }
}

impl CounterCache for RedisCounterCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .context("redis GET failed")
            .map_err(AuthError::Internal)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AuthError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .context("redis SETEX failed")
            .map_err(AuthError::Internal)
    }

    async fn del(&self, key: &str) -> Result<(), AuthError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .context("redis DEL failed")
            .map_err(AuthError::Internal)
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, AuthError> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn
            .ttl(key)
            .await
            .context("redis TTL failed")
            .map_err(AuthError::Internal)?;
        // -2 means the key is absent, -1 means no expiry is set.
        Ok(if ttl < 0 { None } else { Some(ttl) })
    }
}
