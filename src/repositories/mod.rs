pub mod in_memory;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{
    location_stock_settings, stock_item, stock_movement, stock_reservation, ReservationStatus,
    StockKey,
};
use crate::errors::ServiceError;

pub use in_memory::{
    InMemoryLocationSettingsRepository, InMemoryMovementRepository, InMemoryReservationRepository,
    InMemoryStockItemRepository,
};
pub use sql::{
    SqlLocationSettingsRepository, SqlMovementRepository, SqlReservationRepository,
    SqlStockItemRepository,
};

/// Filter for reservation listings. All fields optional; unset fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub item_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
    pub workspace_id: Option<Uuid>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &stock_reservation::Model) -> bool {
        if let Some(item_id) = self.item_id {
            if reservation.item_id != item_id {
                return false;
            }
        }
        if let Some(location_id) = self.location_id {
            if reservation.location_id != location_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if reservation.reservation_status() != Some(status) {
                return false;
            }
        }
        if let Some(workspace_id) = self.workspace_id {
            if reservation.workspace_id != Some(workspace_id) {
                return false;
            }
        }
        true
    }
}

/// Stock balances, keyed by `StockKey`.
///
/// `save` uses optimistic concurrency: the stored row's `version` must equal
/// the incoming model's `version`, and the persisted row gets `version + 1`.
/// A mismatch returns `ConcurrentModification`.
#[async_trait]
pub trait StockItemRepository: Send + Sync {
    async fn find_by_key(&self, key: &StockKey)
        -> Result<Option<stock_item::Model>, ServiceError>;

    async fn list_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<stock_item::Model>, ServiceError>;

    async fn save(&self, item: stock_item::Model) -> Result<stock_item::Model, ServiceError>;
}

/// Append-only movement ledger.
#[async_trait]
pub trait MovementRepository: Send + Sync {
    async fn save(
        &self,
        movement: stock_movement::Model,
    ) -> Result<stock_movement::Model, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<stock_movement::Model>, ServiceError>;

    /// Movements for one stock key, in submission order.
    async fn list_for_key(&self, key: &StockKey)
        -> Result<Vec<stock_movement::Model>, ServiceError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn save(
        &self,
        reservation: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError>;

    /// Persists `updated` only if the stored row is still in `expected`
    /// status. Returns `ConcurrentModification` when another writer got
    /// there first. This is the only way status transitions are persisted.
    async fn save_transition(
        &self,
        expected: ReservationStatus,
        updated: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError>;

    async fn find_by_id(&self, id: Uuid)
        -> Result<Option<stock_reservation::Model>, ServiceError>;

    async fn list(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError>;

    /// Active reservations whose deadline has passed, oldest first, capped
    /// at `limit`.
    async fn find_expired_active(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError>;
}

#[async_trait]
pub trait LocationSettingsRepository: Send + Sync {
    async fn find_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<location_stock_settings::Model>, ServiceError>;

    async fn save(
        &self,
        settings: location_stock_settings::Model,
    ) -> Result<location_stock_settings::Model, ServiceError>;
}
