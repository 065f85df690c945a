use crate::domain::CardResolver;
use common::domain::{
    CacheWriter, CardResolution, DomainResult, FusionEngine, ReadingStore, TelemetryEvent,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// What happened to one telemetry event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// The card was re-fused and its cached state replaced
    Fused { card_id: String },
    /// The device does not feed any card
    Skipped,
}

/// Domain service that routes a telemetry event to its card
///
/// Flow:
/// 1. Resolve the device to a card within the event's tenant
/// 2. Record the event as the device's latest reading
/// 3. Re-fuse the card
/// 4. Write the fused state to the cache
pub struct TelemetryIngestionService {
    resolver: Arc<CardResolver>,
    reading_store: Arc<dyn ReadingStore>,
    fusion_engine: Arc<dyn FusionEngine>,
    cache_writer: Arc<dyn CacheWriter>,
}

impl TelemetryIngestionService {
    pub fn new(
        resolver: Arc<CardResolver>,
        reading_store: Arc<dyn ReadingStore>,
        fusion_engine: Arc<dyn FusionEngine>,
        cache_writer: Arc<dyn CacheWriter>,
    ) -> Self {
        Self {
            resolver,
            reading_store,
            fusion_engine,
            cache_writer,
        }
    }

    #[instrument(skip(self, event), fields(device_id = %event.device_id, tenant_id = %event.tenant_id))]
    pub async fn process_event(&self, event: TelemetryEvent) -> DomainResult<IngestionOutcome> {
        debug!(device_type = %event.device_type, "processing telemetry event");

        let card = match self
            .resolver
            .resolve(&event.tenant_id, &event.device_id)
            .await?
        {
            CardResolution::Found(card) => card,
            CardResolution::NotFound => {
                info!(
                    device_id = %event.device_id,
                    tenant_id = %event.tenant_id,
                    "no card for device, skipping event"
                );
                return Ok(IngestionOutcome::Skipped);
            }
        };

        self.reading_store.record_reading(&event).await?;

        let state = self.fusion_engine.fuse(&card.card_id).await?;
        self.cache_writer.write(&card.card_id, &state).await?;

        info!(
            card_id = %card.card_id,
            device_id = %event.device_id,
            reporting_devices = state.reporting_devices,
            "fused and cached card state"
        );

        Ok(IngestionOutcome::Fused {
            card_id: card.card_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::domain::{
        BindingTarget, Card, CardType, DeviceBinding, DomainError, FusedState,
        GetDeviceBindingRepoInput, MockCacheWriter, MockCardRepository, MockFusionEngine,
        MockReadingStore,
    };

    fn event(tenant_id: &str, device_id: &str) -> TelemetryEvent {
        TelemetryEvent {
            device_id: device_id.to_string(),
            device_type: "Radar".to_string(),
            tenant_id: tenant_id.to_string(),
            payload: serde_json::json!({"presence": true, "heart_rate": 62}),
            timestamp: None,
        }
    }

    fn fused_state(card_id: &str) -> FusedState {
        FusedState {
            card_id: card_id.to_string(),
            tenant_id: "T1".to_string(),
            card_type: CardType::ActiveBed,
            devices: Vec::new(),
            reporting_devices: 1,
            fused_at: Utc::now(),
        }
    }

    /// Repository holding the T1/D1 → B1 → C1 fixture
    fn bed_repository() -> MockCardRepository {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .returning(|input: GetDeviceBindingRepoInput| {
                if input.tenant_id == "T1" && input.device_id == "D1" {
                    Ok(Some(DeviceBinding {
                        device_id: "D1".to_string(),
                        tenant_id: "T1".to_string(),
                        target: BindingTarget::Bed("B1".to_string()),
                    }))
                } else {
                    Ok(None)
                }
            });
        repo.expect_find_active_bed_cards()
            .withf(|tenant_id: &str, bed_id: &str| tenant_id == "T1" && bed_id == "B1")
            .returning(|_, _| {
                Ok(vec![Card {
                    card_id: "C1".to_string(),
                    tenant_id: "T1".to_string(),
                    card_type: CardType::ActiveBed,
                    bed_id: Some("B1".to_string()),
                    unit_id: None,
                }])
            });
        repo
    }

    fn service(
        repo: MockCardRepository,
        readings: MockReadingStore,
        fusion: MockFusionEngine,
        cache: MockCacheWriter,
    ) -> TelemetryIngestionService {
        TelemetryIngestionService::new(
            Arc::new(CardResolver::new(Arc::new(repo))),
            Arc::new(readings),
            Arc::new(fusion),
            Arc::new(cache),
        )
    }

    #[tokio::test]
    async fn test_bound_device_is_fused_and_cached() {
        let mut readings = MockReadingStore::new();
        readings
            .expect_record_reading()
            .withf(|e: &TelemetryEvent| e.device_id == "D1" && e.tenant_id == "T1")
            .times(1)
            .returning(|_| Ok(()));

        let mut fusion = MockFusionEngine::new();
        fusion
            .expect_fuse()
            .withf(|card_id: &str| card_id == "C1")
            .times(1)
            .returning(|card_id| Ok(fused_state(card_id)));

        let mut cache = MockCacheWriter::new();
        cache
            .expect_write()
            .withf(|card_id: &str, state: &FusedState| card_id == "C1" && state.card_id == "C1")
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(bed_repository(), readings, fusion, cache);
        let outcome = service.process_event(event("T1", "D1")).await.unwrap();

        assert_eq!(
            outcome,
            IngestionOutcome::Fused {
                card_id: "C1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_tenant_is_skipped_without_fusion() {
        let mut readings = MockReadingStore::new();
        readings.expect_record_reading().never();
        let mut fusion = MockFusionEngine::new();
        fusion.expect_fuse().never();
        let mut cache = MockCacheWriter::new();
        cache.expect_write().never();

        let service = service(bed_repository(), readings, fusion, cache);
        let outcome = service.process_event(event("T2", "D1")).await.unwrap();

        assert_eq!(outcome, IngestionOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_fusion_error_is_returned_and_cache_untouched() {
        let mut readings = MockReadingStore::new();
        readings.expect_record_reading().returning(|_| Ok(()));
        let mut fusion = MockFusionEngine::new();
        fusion.expect_fuse().returning(|card_id| {
            Err(DomainError::FusionError(
                card_id.to_string(),
                "no devices".to_string(),
            ))
        });
        let mut cache = MockCacheWriter::new();
        cache.expect_write().never();

        let service = service(bed_repository(), readings, fusion, cache);
        let result = service.process_event(event("T1", "D1")).await;

        assert!(matches!(result, Err(DomainError::FusionError(card_id, _)) if card_id == "C1"));
    }

    #[tokio::test]
    async fn test_cache_error_is_returned() {
        let mut readings = MockReadingStore::new();
        readings.expect_record_reading().returning(|_| Ok(()));
        let mut fusion = MockFusionEngine::new();
        fusion
            .expect_fuse()
            .returning(|card_id| Ok(fused_state(card_id)));
        let mut cache = MockCacheWriter::new();
        cache.expect_write().returning(|card_id, _| {
            Err(DomainError::CacheWriteError(
                card_id.to_string(),
                "connection reset".to_string(),
            ))
        });

        let service = service(bed_repository(), readings, fusion, cache);
        let result = service.process_event(event("T1", "D1")).await;

        assert!(matches!(result, Err(DomainError::CacheWriteError(_, _))));
    }

    #[tokio::test]
    async fn test_reading_store_error_stops_before_fusion() {
        let mut readings = MockReadingStore::new();
        readings
            .expect_record_reading()
            .returning(|_| Err(DomainError::ReadingStoreError("timeout".to_string())));
        let mut fusion = MockFusionEngine::new();
        fusion.expect_fuse().never();
        let mut cache = MockCacheWriter::new();
        cache.expect_write().never();

        let service = service(bed_repository(), readings, fusion, cache);
        let result = service.process_event(event("T1", "D1")).await;

        assert!(matches!(result, Err(DomainError::ReadingStoreError(_))));
    }
}
