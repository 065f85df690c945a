use common::domain::{
    BindingTarget, Card, CardRepository, CardResolution, DomainResult, GetDeviceBindingRepoInput,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Maps a tenant-scoped device to the card it feeds.
///
/// Precedence, first match wins:
/// 1. no binding for `(tenant_id, device_id)` → NotFound
/// 2. bed binding → the tenant's ActiveBed card for that bed
/// 3. room binding → the tenant's Location card for the room's unit
/// 4. anything else → NotFound
pub struct CardResolver {
    repository: Arc<dyn CardRepository>,
}

impl CardResolver {
    pub fn new(repository: Arc<dyn CardRepository>) -> Self {
        Self { repository }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, tenant_id: &str, device_id: &str) -> DomainResult<CardResolution> {
        let binding = self
            .repository
            .get_device_binding(GetDeviceBindingRepoInput {
                tenant_id: tenant_id.to_string(),
                device_id: device_id.to_string(),
            })
            .await?;

        let Some(binding) = binding else {
            debug!("device has no binding in tenant");
            return Ok(CardResolution::NotFound);
        };

        let cards = match &binding.target {
            BindingTarget::Bed(bed_id) => {
                self.repository
                    .find_active_bed_cards(tenant_id, bed_id)
                    .await?
            }
            BindingTarget::Room(room_id) => {
                match self.repository.get_room_unit(tenant_id, room_id).await? {
                    Some(unit_id) => {
                        self.repository
                            .find_location_cards(tenant_id, &unit_id)
                            .await?
                    }
                    None => {
                        debug!(room_id = %room_id, "room is not part of a unit");
                        Vec::new()
                    }
                }
            }
            BindingTarget::Unbound => {
                debug!("device is not bound to a bed or room");
                Vec::new()
            }
        };

        Ok(pick_card(&binding.target, cards))
    }

    /// Direct lookup by card id, bypassing device resolution
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, card_id: &str) -> DomainResult<Option<Card>> {
        self.repository.get_card(card_id).await
    }
}

/// Cards arrive ordered by id; more than one match breaks the one-card-per-binding
/// invariant, so it is reported and the first card is used.
fn pick_card(target: &BindingTarget, cards: Vec<Card>) -> CardResolution {
    if cards.len() > 1 {
        let card_ids: Vec<&str> = cards.iter().map(|c| c.card_id.as_str()).collect();
        warn!(
            target = ?target,
            card_ids = ?card_ids,
            "binding matches more than one card, using the first"
        );
    }

    match cards.into_iter().next() {
        Some(card) => CardResolution::Found(card),
        None => CardResolution::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{CardType, DeviceBinding, DomainError, MockCardRepository};

    fn binding(tenant_id: &str, device_id: &str, target: BindingTarget) -> DeviceBinding {
        DeviceBinding {
            device_id: device_id.to_string(),
            tenant_id: tenant_id.to_string(),
            target,
        }
    }

    fn bed_card(card_id: &str, tenant_id: &str, bed_id: &str) -> Card {
        Card {
            card_id: card_id.to_string(),
            tenant_id: tenant_id.to_string(),
            card_type: CardType::ActiveBed,
            bed_id: Some(bed_id.to_string()),
            unit_id: None,
        }
    }

    fn location_card(card_id: &str, tenant_id: &str, unit_id: &str) -> Card {
        Card {
            card_id: card_id.to_string(),
            tenant_id: tenant_id.to_string(),
            card_type: CardType::Location,
            bed_id: None,
            unit_id: Some(unit_id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_bed_binding_resolves_active_bed_card() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .withf(|input: &GetDeviceBindingRepoInput| {
                input.tenant_id == "T1" && input.device_id == "D1"
            })
            .times(1)
            .return_once(|_| Ok(Some(binding("T1", "D1", BindingTarget::Bed("B1".to_string())))));
        repo.expect_find_active_bed_cards()
            .withf(|tenant_id: &str, bed_id: &str| tenant_id == "T1" && bed_id == "B1")
            .times(1)
            .return_once(|_, _| Ok(vec![bed_card("C1", "T1", "B1")]));
        repo.expect_get_room_unit().never();
        repo.expect_find_location_cards().never();

        let resolver = CardResolver::new(Arc::new(repo));
        let result = resolver.resolve("T1", "D1").await.unwrap();

        assert_eq!(result, CardResolution::Found(bed_card("C1", "T1", "B1")));
    }

    #[tokio::test]
    async fn test_room_binding_resolves_location_card_of_unit() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Ok(Some(binding("T1", "D2", BindingTarget::Room("R1".to_string())))));
        repo.expect_find_active_bed_cards().never();
        repo.expect_get_room_unit()
            .withf(|tenant_id: &str, room_id: &str| tenant_id == "T1" && room_id == "R1")
            .times(1)
            .return_once(|_, _| Ok(Some("U1".to_string())));
        repo.expect_find_location_cards()
            .withf(|tenant_id: &str, unit_id: &str| tenant_id == "T1" && unit_id == "U1")
            .times(1)
            .return_once(|_, _| Ok(vec![location_card("C2", "T1", "U1")]));

        let resolver = CardResolver::new(Arc::new(repo));
        let result = resolver.resolve("T1", "D2").await.unwrap();

        assert_eq!(result.card().map(|c| c.card_id.as_str()), Some("C2"));
    }

    #[tokio::test]
    async fn test_bed_without_card_does_not_fall_back_to_room() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Ok(Some(binding("T1", "D1", BindingTarget::Bed("B9".to_string())))));
        repo.expect_find_active_bed_cards()
            .return_once(|_, _| Ok(Vec::new()));
        repo.expect_get_room_unit().never();

        let resolver = CardResolver::new(Arc::new(repo));

        assert_eq!(
            resolver.resolve("T1", "D1").await.unwrap(),
            CardResolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_wrong_tenant_is_not_found() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .withf(|input: &GetDeviceBindingRepoInput| input.tenant_id == "T2")
            .return_once(|_| Ok(None));
        repo.expect_find_active_bed_cards().never();

        let resolver = CardResolver::new(Arc::new(repo));

        assert_eq!(
            resolver.resolve("T2", "D1").await.unwrap(),
            CardResolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_unbound_device_is_not_found() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Ok(Some(binding("T1", "D3", BindingTarget::Unbound))));
        repo.expect_find_active_bed_cards().never();
        repo.expect_get_room_unit().never();
        repo.expect_find_location_cards().never();

        let resolver = CardResolver::new(Arc::new(repo));

        assert_eq!(
            resolver.resolve("T1", "D3").await.unwrap(),
            CardResolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_room_without_unit_is_not_found() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Ok(Some(binding("T1", "D2", BindingTarget::Room("R2".to_string())))));
        repo.expect_get_room_unit()
            .return_once(|_, _| Ok(None));
        repo.expect_find_location_cards().never();

        let resolver = CardResolver::new(Arc::new(repo));

        assert_eq!(
            resolver.resolve("T1", "D2").await.unwrap(),
            CardResolution::NotFound
        );
    }

    #[tokio::test]
    async fn test_duplicate_cards_pick_first() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Ok(Some(binding("T1", "D1", BindingTarget::Bed("B1".to_string())))));
        repo.expect_find_active_bed_cards().return_once(|_, _| {
            Ok(vec![bed_card("C1", "T1", "B1"), bed_card("C7", "T1", "B1")])
        });

        let resolver = CardResolver::new(Arc::new(repo));
        let result = resolver.resolve("T1", "D1").await.unwrap();

        assert_eq!(result.card().map(|c| c.card_id.as_str()), Some("C1"));
    }

    #[tokio::test]
    async fn test_repository_error_is_propagated() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_device_binding()
            .return_once(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("pool exhausted"))));

        let resolver = CardResolver::new(Arc::new(repo));
        let result = resolver.resolve("T1", "D1").await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let mut repo = MockCardRepository::new();
        repo.expect_get_card()
            .withf(|card_id: &str| card_id == "C1")
            .return_once(|_| Ok(Some(bed_card("C1", "T1", "B1"))));
        repo.expect_get_card()
            .withf(|card_id: &str| card_id == "missing")
            .return_once(|_| Ok(None));

        let resolver = CardResolver::new(Arc::new(repo));

        assert!(resolver.get_by_id("C1").await.unwrap().is_some());
        assert!(resolver.get_by_id("missing").await.unwrap().is_none());
    }
}
