use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Telemetry event published by a radar or sleep mat, decoded from the `data`
/// field of a stream entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TelemetryEvent {
    #[garde(length(min = 1))]
    pub device_id: String,

    #[garde(skip)]
    #[serde(default)]
    pub device_type: String,

    #[garde(length(min = 1))]
    pub tenant_id: String,

    /// Sensor-specific reading, opaque to the ingestion pipeline
    #[garde(skip)]
    #[serde(default)]
    pub payload: serde_json::Value,

    #[garde(skip)]
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Raw value of a single stream entry field as delivered by the broker
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Other,
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Integer(_) => "integer",
            FieldValue::Other => "other",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One entry read from the event stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    /// Stream-assigned id, used for acknowledgment
    pub id: String,
    pub fields: HashMap<String, FieldValue>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, fields: HashMap<String, FieldValue>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Latest reading recorded for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub device_id: String,
    pub device_type: String,
    pub payload: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl DeviceReading {
    /// Build a reading from an event, falling back to `received_at` when the
    /// sensor did not stamp the event
    pub fn from_event(event: &TelemetryEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: event.device_id.clone(),
            device_type: event.device_type.clone(),
            payload: event.payload.clone(),
            observed_at: event.timestamp.unwrap_or(received_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserializes_with_defaults() {
        let event: TelemetryEvent =
            serde_json::from_str(r#"{"device_id":"D1","tenant_id":"T1"}"#).unwrap();

        assert_eq!(event.device_id, "D1");
        assert_eq!(event.tenant_id, "T1");
        assert_eq!(event.device_type, "");
        assert!(event.payload.is_null());
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_reading_prefers_event_timestamp() {
        let stamped = "2026-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap();
        let received = Utc::now();
        let mut event = TelemetryEvent {
            device_id: "D1".to_string(),
            device_type: "Radar".to_string(),
            tenant_id: "T1".to_string(),
            payload: serde_json::json!({"heart_rate": 61}),
            timestamp: Some(stamped),
        };

        assert_eq!(DeviceReading::from_event(&event, received).observed_at, stamped);

        event.timestamp = None;
        assert_eq!(DeviceReading::from_event(&event, received).observed_at, received);
    }
}
