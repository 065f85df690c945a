use crate::domain::card::{CardDevice, CardType};
use crate::domain::result::DomainResult;
use crate::domain::telemetry::{DeviceReading, TelemetryEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A card device together with its latest reading, if one is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device: CardDevice,
    pub reading: Option<DeviceReading>,
}

/// Combined real-time state of a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedState {
    pub card_id: String,
    pub tenant_id: String,
    pub card_type: CardType,
    pub devices: Vec<DeviceSnapshot>,
    /// Number of devices with a known reading
    pub reporting_devices: usize,
    pub fused_at: DateTime<Utc>,
}

/// Recomputes a card's fused state from its devices' latest readings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FusionEngine: Send + Sync {
    async fn fuse(&self, card_id: &str) -> DomainResult<FusedState>;
}

/// Persists fused state for low-latency reads by other systems
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CacheWriter: Send + Sync {
    async fn write(&self, card_id: &str, state: &FusedState) -> DomainResult<()>;
}

/// Keeps the latest reading of every device
///
/// Implementations should:
/// - Overwrite any previous reading of the same device
/// - Return `None` for devices without a reading, in request order
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Record an event as its device's latest reading
    async fn record_reading(&self, event: &TelemetryEvent) -> DomainResult<()>;

    /// Latest readings for devices of one tenant
    async fn latest_readings(
        &self,
        tenant_id: &str,
        device_ids: &[String],
    ) -> DomainResult<Vec<Option<DeviceReading>>>;
}
