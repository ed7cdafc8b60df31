use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;

/// Capacity and policy knobs for a location.
///
/// A location without a settings row has no restrictions. Only
/// `max_quantity` is enforced as a hard capacity limit; weight and volume
/// limits are carried as data for reporting.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "location_stock_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub location_id: Uuid,
    pub max_quantity: Option<Decimal>,
    pub max_weight: Option<Decimal>,
    pub max_volume: Option<Decimal>,
    #[sea_orm(column_type = "Json", nullable)]
    pub allowed_item_types: Option<Json>,
    pub allow_mixed_lots: bool,
    pub allow_mixed_skus: bool,
    pub allow_negative_stock: bool,
    pub max_reservation_percentage: Option<i32>,
    pub fifo_enforced: bool,
    pub is_active: bool,
    pub workspace_id: Option<Uuid>,
    #[sea_orm(column_type = "Json", nullable)]
    pub meta: Option<Json>,
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
    /// Unrestricted, active settings for a location.
    pub fn new(location_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            location_id,
            max_quantity: None,
            max_weight: None,
            max_volume: None,
            allowed_item_types: None,
            allow_mixed_lots: true,
            allow_mixed_skus: true,
            allow_negative_stock: false,
            max_reservation_percentage: None,
            fifo_enforced: false,
            is_active: true,
            workspace_id: None,
            meta: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_max_quantity(mut self, max_quantity: Decimal) -> Self {
        self.max_quantity = Some(max_quantity);
        self
    }

    pub fn with_allowed_item_types(mut self, types: &[&str]) -> Self {
        self.allowed_item_types = Some(serde_json::json!(types));
        self
    }

    pub fn with_allow_mixed_skus(mut self, allow: bool) -> Self {
        self.allow_mixed_skus = allow;
        self
    }

    pub fn with_allow_negative_stock(mut self, allow: bool) -> Self {
        self.allow_negative_stock = allow;
        self
    }

    pub fn with_max_reservation_percentage(mut self, pct: i32) -> Self {
        self.max_reservation_percentage = Some(pct);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_workspace(mut self, workspace_id: Option<Uuid>) -> Self {
        self.workspace_id = workspace_id;
        self
    }

    /// The allowed-types whitelist, parsed out of the JSON column. None
    /// means any type is allowed.
    pub fn allowed_item_types(&self) -> Option<Vec<String>> {
        self.allowed_item_types
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_item_type_allowed(&self, item_type: Option<&str>) -> bool {
        match (self.allowed_item_types(), item_type) {
            (None, _) => true,
            (Some(allowed), Some(item_type)) => allowed.iter().any(|t| t == item_type),
            // Whitelist configured but the item has no type.
            (Some(_), None) => false,
        }
    }

    pub fn has_capacity_limit(&self) -> bool {
        self.max_quantity.is_some()
    }

    pub fn remaining_capacity(&self, current_total: Decimal) -> Option<Decimal> {
        self.max_quantity
            .map(|max| (max - current_total).max(Decimal::ZERO))
    }

    pub fn can_accept_quantity(&self, current_total: Decimal, requested: Decimal) -> bool {
        match self.max_quantity {
            Some(max) => current_total + requested <= max,
            None => true,
        }
    }

    /// Maximum quantity allowed to be reserved out of a total on-hand
    /// figure, when a percentage cap is configured.
    pub fn max_reservation_allowed(&self, total: Decimal) -> Option<Decimal> {
        self.max_reservation_percentage
            .map(|pct| total * Decimal::from(pct) / Decimal::from(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_limit_accepts_anything() {
        let settings = Model::new(Uuid::new_v4());
        assert!(!settings.has_capacity_limit());
        assert!(settings.can_accept_quantity(dec!(1_000_000), dec!(1_000_000)));
        assert_eq!(settings.remaining_capacity(dec!(5)), None);
    }

    #[test]
    fn max_quantity_caps_acceptance() {
        let settings = Model::new(Uuid::new_v4()).with_max_quantity(dec!(100));
        assert!(settings.can_accept_quantity(dec!(90), dec!(10)));
        assert!(!settings.can_accept_quantity(dec!(90), dec!(11)));
        assert_eq!(settings.remaining_capacity(dec!(90)), Some(dec!(10)));
        assert_eq!(settings.remaining_capacity(dec!(120)), Some(dec!(0)));
    }

    #[test]
    fn item_type_whitelist() {
        let settings = Model::new(Uuid::new_v4()).with_allowed_item_types(&["frozen", "chilled"]);
        assert!(settings.is_item_type_allowed(Some("frozen")));
        assert!(!settings.is_item_type_allowed(Some("ambient")));
        assert!(!settings.is_item_type_allowed(None));

        let open = Model::new(Uuid::new_v4());
        assert!(open.is_item_type_allowed(None));
        assert!(open.is_item_type_allowed(Some("anything")));
    }

    #[test]
    fn reservation_percentage_cap() {
        let settings = Model::new(Uuid::new_v4()).with_max_reservation_percentage(50);
        assert_eq!(settings.max_reservation_allowed(dec!(200)), Some(dec!(100)));

        let open = Model::new(Uuid::new_v4());
        assert_eq!(open.max_reservation_allowed(dec!(200)), None);
    }
}
