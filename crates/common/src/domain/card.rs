use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of monitoring unit a card represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    /// One bed, reached through a bed binding
    ActiveBed,
    /// One location (unit), reached through a room binding
    Location,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::ActiveBed => "ActiveBed",
            CardType::Location => "Location",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ActiveBed" => Ok(CardType::ActiveBed),
            "Location" => Ok(CardType::Location),
            other => Err(DomainError::InvalidCardType(other.to_string())),
        }
    }
}

/// Card entity: the logical per-bed or per-location monitoring unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub card_id: String,
    pub tenant_id: String,
    pub card_type: CardType,
    pub bed_id: Option<String>,
    pub unit_id: Option<String>,
}

/// What a device is physically bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    Bed(String),
    Room(String),
    Unbound,
}

impl BindingTarget {
    /// Build a target from the nullable bed/room columns.
    ///
    /// Empty strings count as unset. When both are set the bed wins; callers
    /// are expected to report that case via [`BindingTarget::is_conflicting`].
    pub fn from_columns(bound_bed_id: Option<String>, bound_room_id: Option<String>) -> Self {
        let bed = bound_bed_id.filter(|id| !id.is_empty());
        let room = bound_room_id.filter(|id| !id.is_empty());

        match (bed, room) {
            (Some(bed_id), _) => BindingTarget::Bed(bed_id),
            (None, Some(room_id)) => BindingTarget::Room(room_id),
            (None, None) => BindingTarget::Unbound,
        }
    }

    /// True when both bed and room columns carry a value
    pub fn is_conflicting(bound_bed_id: Option<&str>, bound_room_id: Option<&str>) -> bool {
        matches!(
            (bound_bed_id, bound_room_id),
            (Some(bed), Some(room)) if !bed.is_empty() && !room.is_empty()
        )
    }
}

/// Binding of a device to a bed or room, scoped to a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    pub device_id: String,
    pub tenant_id: String,
    pub target: BindingTarget,
}

/// Device entry stored on a card (`cards.devices`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDevice {
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_model: String,
    /// `direct` (bound to the bed) or `indirect` (bound to the room)
    #[serde(default)]
    pub binding_type: String,
}

/// Outcome of resolving a device to its card. Errors are carried separately
/// by [`DomainResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum CardResolution {
    Found(Card),
    NotFound,
}

impl CardResolution {
    pub fn card(&self) -> Option<&Card> {
        match self {
            CardResolution::Found(card) => Some(card),
            CardResolution::NotFound => None,
        }
    }
}

/// Input for looking up a device binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceBindingRepoInput {
    pub tenant_id: String,
    pub device_id: String,
}

/// Read-only access to devices, rooms and cards.
/// Every lookup on the resolution path is scoped by tenant.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Get the binding of a device within a tenant
    async fn get_device_binding(
        &self,
        input: GetDeviceBindingRepoInput,
    ) -> DomainResult<Option<DeviceBinding>>;

    /// List ActiveBed cards for a bed, ordered by card id
    async fn find_active_bed_cards(&self, tenant_id: &str, bed_id: &str)
        -> DomainResult<Vec<Card>>;

    /// Get the unit a room belongs to
    async fn get_room_unit(&self, tenant_id: &str, room_id: &str) -> DomainResult<Option<String>>;

    /// List Location cards for a unit, ordered by card id
    async fn find_location_cards(&self, tenant_id: &str, unit_id: &str)
        -> DomainResult<Vec<Card>>;

    /// Get a card by id
    async fn get_card(&self, card_id: &str) -> DomainResult<Option<Card>>;

    /// List the devices attached to a card
    async fn get_card_devices(&self, card_id: &str) -> DomainResult<Vec<CardDevice>>;
}
