use crate::domain::{
    BindingTarget, Card, CardDevice, CardRepository, CardType, DeviceBinding, DomainError,
    DomainResult, GetDeviceBindingRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument, warn};

/// Device binding row as stored in `devices`
#[derive(Debug, Clone)]
pub struct DeviceBindingRow {
    pub device_id: String,
    pub tenant_id: String,
    pub bound_bed_id: Option<String>,
    pub bound_room_id: Option<String>,
}

impl From<DeviceBindingRow> for DeviceBinding {
    fn from(row: DeviceBindingRow) -> Self {
        if BindingTarget::is_conflicting(row.bound_bed_id.as_deref(), row.bound_room_id.as_deref())
        {
            warn!(
                device_id = %row.device_id,
                tenant_id = %row.tenant_id,
                bound_bed_id = ?row.bound_bed_id,
                bound_room_id = ?row.bound_room_id,
                "device is bound to both a bed and a room, using the bed binding"
            );
        }

        DeviceBinding {
            device_id: row.device_id,
            tenant_id: row.tenant_id,
            target: BindingTarget::from_columns(row.bound_bed_id, row.bound_room_id),
        }
    }
}

/// Card row as stored in `cards`
#[derive(Debug, Clone)]
pub struct CardRow {
    pub card_id: String,
    pub tenant_id: String,
    pub card_type: String,
    pub bed_id: Option<String>,
    pub unit_id: Option<String>,
}

impl TryFrom<CardRow> for Card {
    type Error = DomainError;

    fn try_from(row: CardRow) -> Result<Self, Self::Error> {
        Ok(Card {
            card_type: row.card_type.parse::<CardType>()?,
            card_id: row.card_id,
            tenant_id: row.tenant_id,
            bed_id: row.bed_id,
            unit_id: row.unit_id,
        })
    }
}

impl CardRow {
    fn from_row(row: &Row) -> Self {
        CardRow {
            card_id: row.get(0),
            tenant_id: row.get(1),
            card_type: row.get(2),
            bed_id: row.get(3),
            unit_id: row.get(4),
        }
    }
}

const CARD_COLUMNS: &str = "card_id, tenant_id, card_type, bed_id, unit_id";

/// PostgreSQL implementation of CardRepository
#[derive(Clone)]
pub struct PostgresCardRepository {
    client: PostgresClient,
}

impl PostgresCardRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn query_cards(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> DomainResult<Vec<Card>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(sql, params)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter()
            .map(|row| Card::try_from(CardRow::from_row(row)))
            .collect()
    }
}

#[async_trait]
impl CardRepository for PostgresCardRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id, tenant_id = %input.tenant_id))]
    async fn get_device_binding(
        &self,
        input: GetDeviceBindingRepoInput,
    ) -> DomainResult<Option<DeviceBinding>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT device_id, tenant_id, bound_bed_id, bound_room_id
                 FROM devices
                 WHERE device_id = $1 AND tenant_id = $2",
                &[&input.device_id, &input.tenant_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                let binding_row = DeviceBindingRow {
                    device_id: row.get(0),
                    tenant_id: row.get(1),
                    bound_bed_id: row.get(2),
                    bound_room_id: row.get(3),
                };
                Ok(Some(binding_row.into()))
            }
            None => {
                debug!("no device record for tenant");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn find_active_bed_cards(
        &self,
        tenant_id: &str,
        bed_id: &str,
    ) -> DomainResult<Vec<Card>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
             WHERE tenant_id = $1 AND bed_id = $2 AND card_type = 'ActiveBed'
             ORDER BY card_id"
        );
        self.query_cards(&sql, &[&tenant_id, &bed_id]).await
    }

    #[instrument(skip(self))]
    async fn get_room_unit(&self, tenant_id: &str, room_id: &str) -> DomainResult<Option<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT unit_id FROM rooms WHERE room_id = $1 AND tenant_id = $2",
                &[&room_id, &tenant_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        // unit_id is nullable: a room that is not grouped into a unit has no location card
        Ok(row.and_then(|row| row.get::<_, Option<String>>(0)))
    }

    #[instrument(skip(self))]
    async fn find_location_cards(
        &self,
        tenant_id: &str,
        unit_id: &str,
    ) -> DomainResult<Vec<Card>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
             WHERE tenant_id = $1 AND unit_id = $2 AND card_type = 'Location'
             ORDER BY card_id"
        );
        self.query_cards(&sql, &[&tenant_id, &unit_id]).await
    }

    #[instrument(skip(self))]
    async fn get_card(&self, card_id: &str) -> DomainResult<Option<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE card_id = $1");
        let mut cards = self.query_cards(&sql, &[&card_id]).await?;
        Ok(cards.pop())
    }

    #[instrument(skip(self))]
    async fn get_card_devices(&self, card_id: &str) -> DomainResult<Vec<CardDevice>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt("SELECT devices FROM cards WHERE card_id = $1", &[&card_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .ok_or_else(|| DomainError::CardNotFound(card_id.to_string()))?;

        let devices: Option<serde_json::Value> = row.get(0);
        match devices {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                DomainError::RepositoryError(anyhow::anyhow!(
                    "invalid devices JSON on card {}: {}",
                    card_id,
                    e
                ))
            }),
            None => Ok(Vec::new()),
        }
    }
}
