use crate::domain::{CacheWriter, DomainError, DomainResult, FusedState};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, instrument};

/// Writes fused card state as JSON under `{prefix}:{card_id}:realtime`
pub struct RedisCacheWriter {
    connection: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisCacheWriter {
    pub fn new(connection: ConnectionManager, key_prefix: String, ttl: Duration) -> Self {
        Self {
            connection,
            key_prefix,
            ttl,
        }
    }

    pub fn cache_key(&self, card_id: &str) -> String {
        realtime_key(&self.key_prefix, card_id)
    }
}

/// Cache key holding a card's realtime state
pub fn realtime_key(key_prefix: &str, card_id: &str) -> String {
    format!("{}:{}:realtime", key_prefix, card_id)
}

#[async_trait]
impl CacheWriter for RedisCacheWriter {
    #[instrument(skip(self, state), fields(devices = state.devices.len()))]
    async fn write(&self, card_id: &str, state: &FusedState) -> DomainResult<()> {
        let payload = serde_json::to_string(state)
            .map_err(|e| DomainError::CacheWriteError(card_id.to_string(), e.to_string()))?;

        let key = self.cache_key(card_id);
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&key, payload, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| DomainError::CacheWriteError(card_id.to_string(), e.to_string()))?;

        debug!(key = %key, "cached fused card state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_key_format() {
        assert_eq!(
            realtime_key("sensor_fusion:card", "C1"),
            "sensor_fusion:card:C1:realtime"
        );
    }
}
