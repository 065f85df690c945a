use crate::domain::{CacheWriter, ReadingStore};
use crate::redis::cache_writer::RedisCacheWriter;
use crate::redis::reading_store::RedisReadingStore;
use crate::redis::stream_client::RedisStreamGroupClient;
use crate::redis::traits::StreamGroupClient;
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Redis connection shared by the stream client, cache writer and reading store.
/// The underlying connection manager reconnects on its own after broker outages.
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to Redis");

        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .context("Timed out connecting to Redis")?
            .context("Failed to connect to Redis")?;

        info!("Successfully connected to Redis");
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Create a StreamGroupClient trait object from this client
    pub fn create_stream_client(&self) -> Arc<dyn StreamGroupClient> {
        Arc::new(RedisStreamGroupClient::new(self.connection.clone()))
    }

    /// Create a CacheWriter trait object storing fused state under `key_prefix`
    pub fn create_cache_writer(&self, key_prefix: &str, ttl: Duration) -> Arc<dyn CacheWriter> {
        Arc::new(RedisCacheWriter::new(
            self.connection.clone(),
            key_prefix.to_string(),
            ttl,
        ))
    }

    /// Create a ReadingStore trait object storing latest readings under `key_prefix`
    pub fn create_reading_store(&self, key_prefix: &str, ttl: Duration) -> Arc<dyn ReadingStore> {
        Arc::new(RedisReadingStore::new(
            self.connection.clone(),
            key_prefix.to_string(),
            ttl,
        ))
    }

    pub async fn close(self) {
        info!("Closing Redis connection");
        // Connection closes when the last manager handle is dropped
    }
}
