//! Redis-backed cache adapter

use async_trait::async_trait;
use psi_engine::{CacheError, NoCache, PsiCache};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::Result;

/// Write-once cache on a shared Redis instance
///
/// Uses a multiplexed connection, so clones of one `RedisCache` share a
/// single socket. Puts go through `SET NX`.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(host: &str, port: u16) -> std::result::Result<Self, CacheError> {
        let url = format!("redis://{}:{}/", host, port);
        let client = redis::Client::open(url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("{}: {}", url, e)))?;
        tracing::info!(host, port, "Connected to Redis cache");
        Ok(Self { connection })
    }
}

fn backend_error(err: redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Connection(err.to_string())
    } else {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
impl PsiCache for RedisCache {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key).await.map_err(backend_error)
    }

    async fn put(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let stored: bool = conn.set_nx(key, value).await.map_err(backend_error)?;
        if stored {
            return Ok(());
        }

        let existing: Option<String> = conn.get(key).await.map_err(backend_error)?;
        match existing {
            Some(existing) if existing == value => Ok(()),
            _ => Err(CacheError::KeyConflict { key: key.to_string() }),
        }
    }
}

/// Build the cache selected by `config`; connection failures are fatal
pub async fn cache_from_config(config: &CacheConfig) -> Result<Arc<dyn PsiCache>> {
    if !config.enabled {
        return Ok(Arc::new(NoCache));
    }
    let cache = RedisCache::connect(&config.host, config.port).await?;
    Ok(Arc::new(cache))
}
