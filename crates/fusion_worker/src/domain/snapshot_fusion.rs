use async_trait::async_trait;
use chrono::Utc;
use common::domain::{
    CardRepository, DeviceSnapshot, DomainError, DomainResult, FusedState, FusionEngine,
    ReadingStore,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Fusion engine that snapshots the latest reading of every device on a card.
/// Readings are passed through as-is; no values are combined.
pub struct SnapshotFusionEngine {
    repository: Arc<dyn CardRepository>,
    reading_store: Arc<dyn ReadingStore>,
}

impl SnapshotFusionEngine {
    pub fn new(repository: Arc<dyn CardRepository>, reading_store: Arc<dyn ReadingStore>) -> Self {
        Self {
            repository,
            reading_store,
        }
    }
}

#[async_trait]
impl FusionEngine for SnapshotFusionEngine {
    #[instrument(skip(self))]
    async fn fuse(&self, card_id: &str) -> DomainResult<FusedState> {
        let card = self
            .repository
            .get_card(card_id)
            .await?
            .ok_or_else(|| DomainError::CardNotFound(card_id.to_string()))?;

        let devices = self.repository.get_card_devices(card_id).await?;
        let device_ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();

        // Readings are stored per tenant, so a card only sees its own tenant's devices
        let readings = self
            .reading_store
            .latest_readings(&card.tenant_id, &device_ids)
            .await?;

        if readings.len() != devices.len() {
            return Err(DomainError::FusionError(
                card_id.to_string(),
                format!(
                    "expected {} readings, reading store returned {}",
                    devices.len(),
                    readings.len()
                ),
            ));
        }

        let snapshots: Vec<DeviceSnapshot> = devices
            .into_iter()
            .zip(readings)
            .map(|(device, reading)| DeviceSnapshot { device, reading })
            .collect();
        let reporting_devices = snapshots.iter().filter(|s| s.reading.is_some()).count();

        debug!(
            device_count = snapshots.len(),
            reporting_devices, "built card snapshot"
        );

        Ok(FusedState {
            card_id: card.card_id,
            tenant_id: card.tenant_id,
            card_type: card.card_type,
            devices: snapshots,
            reporting_devices,
            fused_at: Utc::now(),
        })
    }
}
