//! Shared handle to the Redis backing store.
//!
//! Every stateful component (queue, ledger, provider-choice cache) borrows a
//! clone of [`Store`]; the underlying deadpool pool is cheap to clone and
//! serializes access to the store across workers.

use deadpool_redis::{Config, Connection, Pool, Runtime};
use thiserror::Error;

/// Errors surfaced by backing-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not be created from the configured URL.
    #[error("failed to create store pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    /// No connection could be checked out of the pool.
    #[error("store pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A command failed against the store.
    #[error("store command error: {0}")]
    Command(#[from] redis::RedisError),
}

/// Cloneable handle to the backing store.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Build a pooled store handle from a Redis URL.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    /// Check a connection out of the pool.
    pub(crate) async fn conn(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a PING, verifying the store is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
