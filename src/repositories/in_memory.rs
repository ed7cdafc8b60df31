use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::{
    location_stock_settings, stock_item, stock_movement, stock_reservation, ReservationStatus,
    StockKey,
};
use crate::errors::ServiceError;

use super::{
    LocationSettingsRepository, MovementRepository, ReservationFilter, ReservationRepository,
    StockItemRepository,
};

/// Stock balances held in a `DashMap`. The entry API gives the same
/// check-and-set semantics the SQL implementation gets from a
/// version-filtered UPDATE.
#[derive(Debug, Default)]
pub struct InMemoryStockItemRepository {
    items: DashMap<StockKey, stock_item::Model>,
}

impl InMemoryStockItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockItemRepository for InMemoryStockItemRepository {
    async fn find_by_key(
        &self,
        key: &StockKey,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    async fn list_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<stock_item::Model>, ServiceError> {
        Ok(self
            .items
            .iter()
            .filter(|entry| {
                let item = entry.value();
                item.location_id == location_id && item.workspace_id == workspace_id
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save(&self, item: stock_item::Model) -> Result<stock_item::Model, ServiceError> {
        let key = item.stock_key();
        let mut entry = self.items.entry(key).or_insert_with(|| item.clone());
        if entry.value().id != item.id || entry.value().version != item.version {
            return Err(ServiceError::ConcurrentModification(item.id));
        }
        let mut next = item;
        next.version += 1;
        next.updated_at = Some(Utc::now());
        *entry.value_mut() = next.clone();
        Ok(next)
    }
}

/// Movement ledger as an ordered append-only vector.
#[derive(Debug, Default)]
pub struct InMemoryMovementRepository {
    movements: RwLock<Vec<stock_movement::Model>>,
}

impl InMemoryMovementRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovementRepository for InMemoryMovementRepository {
    async fn save(
        &self,
        movement: stock_movement::Model,
    ) -> Result<stock_movement::Model, ServiceError> {
        let mut ledger = self.movements.write().await;
        if let Some(existing) = ledger.iter_mut().find(|m| m.id == movement.id) {
            *existing = movement.clone();
        } else {
            ledger.push(movement.clone());
        }
        Ok(movement)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<stock_movement::Model>, ServiceError> {
        let ledger = self.movements.read().await;
        Ok(ledger.iter().find(|m| m.id == id).cloned())
    }

    async fn list_for_key(
        &self,
        key: &StockKey,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let ledger = self.movements.read().await;
        Ok(ledger
            .iter()
            .filter(|m| {
                m.item_id == key.item_id
                    && m.location_id == key.location_id
                    && m.lot_number == key.lot_number
                    && m.workspace_id == key.workspace_id
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReservationRepository {
    reservations: DashMap<Uuid, stock_reservation::Model>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn save(
        &self,
        reservation: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError> {
        self.reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn save_transition(
        &self,
        expected: ReservationStatus,
        updated: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let mut entry = self
            .reservations
            .get_mut(&updated.id)
            .ok_or_else(|| ServiceError::NotFound(format!("reservation {}", updated.id)))?;
        if entry.value().reservation_status() != Some(expected) {
            return Err(ServiceError::ConcurrentModification(updated.id));
        }
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<stock_reservation::Model>, ServiceError> {
        Ok(self.reservations.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        let mut matched: Vec<_> = self
            .reservations
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }

    async fn find_expired_active(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        let mut expired: Vec<_> = self
            .reservations
            .iter()
            .filter(|entry| entry.value().is_expired(as_of))
            .map(|entry| entry.value().clone())
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocationSettingsRepository {
    settings: DashMap<(Uuid, Option<Uuid>), location_stock_settings::Model>,
}

impl InMemoryLocationSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationSettingsRepository for InMemoryLocationSettingsRepository {
    async fn find_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<location_stock_settings::Model>, ServiceError> {
        Ok(self
            .settings
            .get(&(location_id, workspace_id))
            .map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        settings: location_stock_settings::Model,
    ) -> Result<location_stock_settings::Model, ServiceError> {
        self.settings.insert(
            (settings.location_id, settings.workspace_id),
            settings.clone(),
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn stock_item_save_bumps_version() {
        let repo = InMemoryStockItemRepository::new();
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        let item = stock_item::Model::new_empty(&key);

        let saved = repo.save(item).await.unwrap();
        assert_eq!(saved.version, 1);

        let saved = repo.save(saved.with_quantity(dec!(5))).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(
            repo.find_by_key(&key).await.unwrap().unwrap().quantity,
            dec!(5)
        );
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let repo = InMemoryStockItemRepository::new();
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        let item = stock_item::Model::new_empty(&key);

        let fresh = repo.save(item.clone()).await.unwrap();
        // A second writer still holding version 0 loses.
        let result = repo.save(item.with_quantity(dec!(9))).await;
        assert_matches!(result, Err(ServiceError::ConcurrentModification(_)));

        // The winner's state survives.
        let stored = repo.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.version, fresh.version);
    }

    #[tokio::test]
    async fn reservation_transition_is_status_guarded() {
        let repo = InMemoryReservationRepository::new();
        let reservation = stock_reservation::Model::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(3),
            ReservationStatus::Pending,
        );
        repo.save(reservation.clone()).await.unwrap();

        let active = reservation.approve().unwrap();
        repo.save_transition(ReservationStatus::Pending, active.clone())
            .await
            .unwrap();

        // Second approval attempt against a now-active row fails.
        let result = repo
            .save_transition(ReservationStatus::Pending, active)
            .await;
        assert_matches!(result, Err(ServiceError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn expired_lookup_honors_limit_and_order() {
        let repo = InMemoryReservationRepository::new();
        let now = Utc::now();
        for minutes in [30, 10, 20] {
            let reservation = stock_reservation::Model::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                dec!(1),
                ReservationStatus::Pending,
            )
            .with_expires_at(now - chrono::Duration::minutes(minutes))
            .approve()
            .unwrap();
            repo.save(reservation).await.unwrap();
        }

        let expired = repo.find_expired_active(now, 2).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert!(expired[0].expires_at <= expired[1].expires_at);
    }
}
