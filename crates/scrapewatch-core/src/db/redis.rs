//! Redis connection pool

use deadpool_redis::{Config as RedisConfig, Connection, Pool, Runtime};

use crate::error::{Error, Result};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub fn new(url: &str) -> Result<Self> {
        let cfg = RedisConfig::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Redis(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    /// Check out a connection
    pub async fn get(&self) -> Result<Connection> {
        self.pool.get().await.map_err(|e| Error::Redis(e.to_string()))
    }
}
