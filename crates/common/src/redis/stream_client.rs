use crate::domain::{FieldValue, StreamEntry};
use crate::redis::traits::{ReadGroupRequest, StreamGroupClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisResult};
use tracing::{debug, info, instrument};

/// Redis error code returned by XGROUP CREATE when the group already exists
const BUSYGROUP: &str = "BUSYGROUP";

/// Concrete implementation of StreamGroupClient using Redis Streams
pub struct RedisStreamGroupClient {
    connection: ConnectionManager,
}

impl RedisStreamGroupClient {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl StreamGroupClient for RedisStreamGroupClient {
    #[instrument(skip(self))]
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.connection.clone();

        // Start from the beginning so entries added before the group existed are consumed
        let created: RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;

        match created {
            Ok(()) => {
                info!(stream = %stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some(BUSYGROUP) => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to create consumer group"),
        }
    }

    async fn read_group(&self, request: ReadGroupRequest) -> Result<Vec<StreamEntry>> {
        let mut conn = self.connection.clone();

        let mut options = StreamReadOptions::default()
            .group(&request.group, &request.consumer)
            .count(request.count);
        let block_ms = request.block.as_millis() as usize;
        if block_ms > 0 {
            options = options.block(block_ms);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&request.stream], &[&request.cursor], &options)
            .await
            .context("Failed to read from stream")?;

        let entries = reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(stream_entry_from_redis)
                    .collect()
            })
            .unwrap_or_default();

        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let acked: usize = conn
            .xack(stream, group, ids)
            .await
            .context("Failed to acknowledge stream entries")?;
        Ok(acked)
    }
}

fn stream_entry_from_redis(entry: StreamId) -> StreamEntry {
    let fields = entry
        .map
        .into_iter()
        .map(|(name, value)| (name, field_value_from_redis(value)))
        .collect();

    StreamEntry::new(entry.id, fields)
}

/// Convert a raw Redis value into a typed field value at the boundary
pub fn field_value_from_redis(value: redis::Value) -> FieldValue {
    match value {
        redis::Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(text) => FieldValue::Text(text),
            Err(e) => FieldValue::Bytes(e.into_bytes()),
        },
        redis::Value::SimpleString(text) => FieldValue::Text(text),
        redis::Value::Int(number) => FieldValue::Integer(number),
        _ => FieldValue::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_bulk_string_is_text() {
        let value = redis::Value::BulkString(br#"{"device_id":"D1"}"#.to_vec());
        assert_eq!(
            field_value_from_redis(value),
            FieldValue::Text(r#"{"device_id":"D1"}"#.to_string())
        );
    }

    #[test]
    fn test_non_utf8_bulk_string_is_bytes() {
        let value = redis::Value::BulkString(vec![0xff, 0xfe]);
        assert_eq!(field_value_from_redis(value), FieldValue::Bytes(vec![0xff, 0xfe]));
    }

    #[test]
    fn test_other_values() {
        assert_eq!(field_value_from_redis(redis::Value::Int(7)), FieldValue::Integer(7));
        assert_eq!(field_value_from_redis(redis::Value::Nil), FieldValue::Other);
    }

    #[test]
    fn test_stream_entry_conversion_keeps_id() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "data".to_string(),
            redis::Value::BulkString(b"payload".to_vec()),
        );
        let mut raw = StreamId::default();
        raw.id = "1700000000000-0".to_string();
        raw.map = map;

        let entry = stream_entry_from_redis(raw);

        assert_eq!(entry.id, "1700000000000-0");
        assert_eq!(entry.field("data"), Some(&FieldValue::Text("payload".to_string())));
    }
}
