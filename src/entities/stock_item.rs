use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;

/// Identity of a stock balance: one row per item, location, optional lot and
/// optional workspace. Two keys differing in any component are independent
/// balances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub lot_number: Option<String>,
    pub workspace_id: Option<Uuid>,
}

impl StockKey {
    pub fn new(item_id: Uuid, location_id: Uuid) -> Self {
        Self {
            item_id,
            location_id,
            lot_number: None,
            workspace_id: None,
        }
    }

    pub fn with_lot(mut self, lot_number: impl Into<String>) -> Self {
        self.lot_number = Some(lot_number.into());
        self
    }

    pub fn with_workspace(mut self, workspace_id: Option<Uuid>) -> Self {
        self.workspace_id = workspace_id;
        self
    }
}

/// Current stock balance for one `StockKey`.
///
/// Invariant: `reserved_quantity <= quantity` and both are non-negative,
/// unless the owning location explicitly allows negative stock. The
/// `version` column backs optimistic concurrency; a save with a stale
/// version is rejected by the repository.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub catalog_item_id: Option<String>,
    pub catalog_origin: Option<String>,
    pub lot_number: Option<String>,
    pub lot_expires_at: Option<DateTime<Utc>>,
    pub serial_number: Option<String>,
    pub quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub workspace_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(Some(now));
        Ok(active_model)
    }
}

impl Model {
    /// An empty balance for a key that has never seen stock. Created lazily
    /// by inbound movements only.
    pub fn new_empty(key: &StockKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: key.item_id,
            location_id: key.location_id,
            catalog_item_id: None,
            catalog_origin: None,
            lot_number: key.lot_number.clone(),
            lot_expires_at: None,
            serial_number: None,
            quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            workspace_id: key.workspace_id,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey {
            item_id: self.item_id,
            location_id: self.location_id,
            lot_number: self.lot_number.clone(),
            workspace_id: self.workspace_id,
        }
    }

    /// On-hand quantity not committed to any reservation.
    pub fn available_quantity(&self) -> Decimal {
        self.quantity - self.reserved_quantity
    }

    pub fn has_available(&self, requested: Decimal) -> bool {
        self.available_quantity() >= requested
    }

    pub fn can_reserve(&self, requested: Decimal) -> bool {
        requested > Decimal::ZERO && self.has_available(requested)
    }

    pub fn can_release(&self, requested: Decimal) -> bool {
        requested > Decimal::ZERO && self.reserved_quantity >= requested
    }

    pub fn lot_is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.lot_expires_at.map(|at| at <= as_of).unwrap_or(false)
    }

    pub fn with_quantity(&self, quantity: Decimal) -> Self {
        let mut next = self.clone();
        next.quantity = quantity;
        next
    }

    pub fn with_reserved_quantity(&self, reserved_quantity: Decimal) -> Self {
        let mut next = self.clone();
        next.reserved_quantity = reserved_quantity;
        next
    }

    pub fn adjust_quantity(&self, delta: Decimal) -> Self {
        self.with_quantity(self.quantity + delta)
    }

    pub fn adjust_reserved_quantity(&self, delta: Decimal) -> Self {
        self.with_reserved_quantity(self.reserved_quantity + delta)
    }

    pub fn with_lot_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.lot_expires_at = Some(expires_at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn item_with(quantity: Decimal, reserved: Decimal) -> Model {
        let key = StockKey::new(Uuid::new_v4(), Uuid::new_v4());
        Model::new_empty(&key)
            .with_quantity(quantity)
            .with_reserved_quantity(reserved)
    }

    #[test]
    fn available_is_quantity_minus_reserved() {
        let item = item_with(dec!(100), dec!(80));
        assert_eq!(item.available_quantity(), dec!(20));
        assert!(item.has_available(dec!(20)));
        assert!(!item.has_available(dec!(21)));
    }

    #[test]
    fn reserve_and_release_predicates() {
        let item = item_with(dec!(10), dec!(4));
        assert!(item.can_reserve(dec!(6)));
        assert!(!item.can_reserve(dec!(7)));
        assert!(!item.can_reserve(Decimal::ZERO));
        assert!(item.can_release(dec!(4)));
        assert!(!item.can_release(dec!(5)));
    }

    #[test]
    fn copy_on_write_leaves_original_untouched() {
        let item = item_with(dec!(5), Decimal::ZERO);
        let bumped = item.adjust_quantity(dec!(3));
        assert_eq!(item.quantity, dec!(5));
        assert_eq!(bumped.quantity, dec!(8));
    }

    #[test]
    fn lot_expiration_guard() {
        let now = Utc::now();
        let fresh = item_with(dec!(1), Decimal::ZERO);
        assert!(!fresh.lot_is_expired(now));

        let expired = fresh.clone().with_lot_expiration(now - Duration::days(1));
        assert!(expired.lot_is_expired(now));

        let future = fresh.with_lot_expiration(now + Duration::days(1));
        assert!(!future.lot_is_expired(now));
    }

    #[test]
    fn keys_with_different_lots_are_distinct() {
        let item_id = Uuid::new_v4();
        let location_id = Uuid::new_v4();
        let a = StockKey::new(item_id, location_id).with_lot("LOT-A");
        let b = StockKey::new(item_id, location_id).with_lot("LOT-B");
        assert_ne!(a, b);
    }
}
