use crate::domain::{DeviceReading, DomainError, DomainResult, ReadingStore, TelemetryEvent};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Writes the reading only when no newer one is stored.
/// KEYS: reading, observed-at marker. ARGV: reading json, observed-at millis, ttl seconds.
const RECORD_IF_NEWER: &str = r#"
local stored = redis.call('GET', KEYS[2])
if stored and tonumber(stored) > tonumber(ARGV[2]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// Keeps each device's latest reading as JSON under `{prefix}:{tenant_id}:{device_id}:latest`
///
/// A reading older than the stored one (by `observed_at`) is ignored, so replayed
/// entries never roll a device back.
pub struct RedisReadingStore {
    connection: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
    record_script: Script,
}

impl RedisReadingStore {
    pub fn new(connection: ConnectionManager, key_prefix: String, ttl: Duration) -> Self {
        Self {
            connection,
            key_prefix,
            ttl,
            record_script: Script::new(RECORD_IF_NEWER),
        }
    }

    fn reading_key(&self, tenant_id: &str, device_id: &str) -> String {
        latest_reading_key(&self.key_prefix, tenant_id, device_id)
    }
}

/// Marker key holding the `observed_at` of the stored reading, in epoch millis
fn observed_at_key(reading_key: &str) -> String {
    format!("{}:observed_at", reading_key)
}

pub fn latest_reading_key(key_prefix: &str, tenant_id: &str, device_id: &str) -> String {
    format!("{}:{}:{}:latest", key_prefix, tenant_id, device_id)
}

#[async_trait]
impl ReadingStore for RedisReadingStore {
    #[instrument(skip(self, event), fields(device_id = %event.device_id, tenant_id = %event.tenant_id))]
    async fn record_reading(&self, event: &TelemetryEvent) -> DomainResult<()> {
        let reading = DeviceReading::from_event(event, Utc::now());
        let payload = serde_json::to_string(&reading)
            .map_err(|e| DomainError::ReadingStoreError(e.to_string()))?;

        let key = self.reading_key(&event.tenant_id, &event.device_id);

        let mut conn = self.connection.clone();
        let written: i64 = self
            .record_script
            .key(&key)
            .key(observed_at_key(&key))
            .arg(payload)
            .arg(reading.observed_at.timestamp_millis())
            .arg(self.ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| DomainError::ReadingStoreError(e.to_string()))?;

        if written == 0 {
            debug!(observed_at = %reading.observed_at, "ignoring reading older than the stored one");
        }

        Ok(())
    }

    #[instrument(skip(self, device_ids), fields(device_count = device_ids.len()))]
    async fn latest_readings(
        &self,
        tenant_id: &str,
        device_ids: &[String],
    ) -> DomainResult<Vec<Option<DeviceReading>>> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = device_ids
            .iter()
            .map(|device_id| self.reading_key(tenant_id, device_id))
            .collect();

        let mut conn = self.connection.clone();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::ReadingStoreError(e.to_string()))?;

        let readings = raw
            .into_iter()
            .zip(device_ids)
            .map(|(value, device_id)| {
                value.and_then(|json| match serde_json::from_str::<DeviceReading>(&json) {
                    Ok(reading) => Some(reading),
                    Err(e) => {
                        warn!(device_id = %device_id, error = %e, "discarding unreadable stored reading");
                        None
                    }
                })
            })
            .collect();

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_reading_key_is_tenant_scoped() {
        assert_eq!(
            latest_reading_key("sensor_fusion:reading", "T1", "D1"),
            "sensor_fusion:reading:T1:D1:latest"
        );
        assert_ne!(
            latest_reading_key("p", "T1", "D1"),
            latest_reading_key("p", "T2", "D1")
        );
    }

    #[test]
    fn test_observed_at_marker_sits_next_to_reading() {
        assert_eq!(
            observed_at_key("sensor_fusion:reading:T1:D1:latest"),
            "sensor_fusion:reading:T1:D1:latest:observed_at"
        );
    }
}
