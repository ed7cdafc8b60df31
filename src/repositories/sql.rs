use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect,
};
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

fn lot_filter(
    query: sea_orm::Select<stock_item::Entity>,
    lot_number: &Option<String>,
) -> sea_orm::Select<stock_item::Entity> {
    match lot_number {
        Some(lot) => query.filter(stock_item::Column::LotNumber.eq(lot.clone())),
        None => query.filter(stock_item::Column::LotNumber.is_null()),
    }
}

fn workspace_filter<E, C>(
    query: sea_orm::Select<E>,
    column: C,
    workspace_id: Option<Uuid>,
) -> sea_orm::Select<E>
where
    E: EntityTrait,
    C: ColumnTrait,
{
    match workspace_id {
        Some(id) => query.filter(column.eq(id)),
        None => query.filter(column.is_null()),
    }
}

/// sea-orm-backed stock balances. Optimistic concurrency is a
/// version-filtered UPDATE; zero rows affected means another writer won.
pub struct SqlStockItemRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlStockItemRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StockItemRepository for SqlStockItemRepository {
    async fn find_by_key(
        &self,
        key: &StockKey,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        let query = stock_item::Entity::find()
            .filter(stock_item::Column::ItemId.eq(key.item_id))
            .filter(stock_item::Column::LocationId.eq(key.location_id));
        let query = lot_filter(query, &key.lot_number);
        let query = workspace_filter(query, stock_item::Column::WorkspaceId, key.workspace_id);

        query.one(&*self.db).await.map_err(ServiceError::db_error)
    }

    async fn list_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<stock_item::Model>, ServiceError> {
        let query = stock_item::Entity::find()
            .filter(stock_item::Column::LocationId.eq(location_id));
        let query = workspace_filter(query, stock_item::Column::WorkspaceId, workspace_id);

        query.all(&*self.db).await.map_err(ServiceError::db_error)
    }

    async fn save(&self, item: stock_item::Model) -> Result<stock_item::Model, ServiceError> {
        let expected_version = item.version;
        let mut next = item;
        next.version += 1;
        next.updated_at = Some(Utc::now());

        if expected_version == 0 {
            stock_item::Entity::insert(next.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
            return Ok(next);
        }

        let result = stock_item::Entity::update_many()
            .set(next.clone().into_active_model().reset_all())
            .filter(stock_item::Column::Id.eq(next.id))
            .filter(stock_item::Column::Version.eq(expected_version))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(next.id));
        }
        Ok(next)
    }
}

pub struct SqlMovementRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlMovementRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MovementRepository for SqlMovementRepository {
    async fn save(
        &self,
        movement: stock_movement::Model,
    ) -> Result<stock_movement::Model, ServiceError> {
        let exists = stock_movement::Entity::find_by_id(movement.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();

        if exists {
            stock_movement::Entity::update(movement.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        } else {
            stock_movement::Entity::insert(movement.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        }
        Ok(movement)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_for_key(
        &self,
        key: &StockKey,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let mut query = stock_movement::Entity::find()
            .filter(stock_movement::Column::ItemId.eq(key.item_id))
            .filter(stock_movement::Column::LocationId.eq(key.location_id));
        query = match &key.lot_number {
            Some(lot) => query.filter(stock_movement::Column::LotNumber.eq(lot.clone())),
            None => query.filter(stock_movement::Column::LotNumber.is_null()),
        };
        query = match key.workspace_id {
            Some(id) => query.filter(stock_movement::Column::WorkspaceId.eq(id)),
            None => query.filter(stock_movement::Column::WorkspaceId.is_null()),
        };

        query
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

pub struct SqlReservationRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlReservationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReservationRepository for SqlReservationRepository {
    async fn save(
        &self,
        reservation: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let exists = stock_reservation::Entity::find_by_id(reservation.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();

        if exists {
            stock_reservation::Entity::update(reservation.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        } else {
            stock_reservation::Entity::insert(reservation.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        }
        Ok(reservation)
    }

    async fn save_transition(
        &self,
        expected: ReservationStatus,
        updated: stock_reservation::Model,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let result = stock_reservation::Entity::update_many()
            .set(updated.clone().into_active_model().reset_all())
            .filter(stock_reservation::Column::Id.eq(updated.id))
            .filter(stock_reservation::Column::Status.eq(expected.as_str()))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            let exists = stock_reservation::Entity::find_by_id(updated.id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .is_some();
            if !exists {
                return Err(ServiceError::NotFound(format!("reservation {}", updated.id)));
            }
            return Err(ServiceError::ConcurrentModification(updated.id));
        }
        Ok(updated)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<stock_reservation::Model>, ServiceError> {
        stock_reservation::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        let mut query = stock_reservation::Entity::find();
        if let Some(item_id) = filter.item_id {
            query = query.filter(stock_reservation::Column::ItemId.eq(item_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(stock_reservation::Column::LocationId.eq(location_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(stock_reservation::Column::Status.eq(status.as_str()));
        }
        if let Some(workspace_id) = filter.workspace_id {
            query = query.filter(stock_reservation::Column::WorkspaceId.eq(workspace_id));
        }

        query
            .order_by_asc(stock_reservation::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_expired_active(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        stock_reservation::Entity::find()
            .filter(stock_reservation::Column::Status.eq(ReservationStatus::Active.as_str()))
            .filter(stock_reservation::Column::ExpiresAt.is_not_null())
            .filter(stock_reservation::Column::ExpiresAt.lte(as_of))
            .order_by_asc(stock_reservation::Column::ExpiresAt)
            .limit(limit as u64)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

pub struct SqlLocationSettingsRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlLocationSettingsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocationSettingsRepository for SqlLocationSettingsRepository {
    async fn find_by_location(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<location_stock_settings::Model>, ServiceError> {
        let query = location_stock_settings::Entity::find()
            .filter(location_stock_settings::Column::LocationId.eq(location_id));
        let query = workspace_filter(
            query,
            location_stock_settings::Column::WorkspaceId,
            workspace_id,
        );

        query.one(&*self.db).await.map_err(ServiceError::db_error)
    }

    async fn save(
        &self,
        settings: location_stock_settings::Model,
    ) -> Result<location_stock_settings::Model, ServiceError> {
        let exists = location_stock_settings::Entity::find_by_id(settings.id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();

        if exists {
            location_stock_settings::Entity::update(settings.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        } else {
            location_stock_settings::Entity::insert(settings.clone().into_active_model().reset_all())
                .exec(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
        }
        Ok(settings)
    }
}
