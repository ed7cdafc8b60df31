use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::location_stock_settings;
use crate::errors::ServiceError;
use crate::gateways::{CatalogGateway, LocationGateway};
use crate::repositories::{LocationSettingsRepository, StockItemRepository};

pub const LOCATION_NOT_ACTIVE: &str = "LOCATION_NOT_ACTIVE";
pub const ITEM_TYPE_NOT_ALLOWED: &str = "ITEM_TYPE_NOT_ALLOWED";
pub const MIXED_SKUS_NOT_ALLOWED: &str = "MIXED_SKUS_NOT_ALLOWED";
pub const EXCEEDS_MAX_QUANTITY: &str = "EXCEEDS_MAX_QUANTITY";

/// One capacity rule violation, with a machine-readable code and enough
/// context for a caller to render a useful message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityError {
    pub code: String,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityCheck {
    pub allowed: bool,
    pub errors: Vec<CapacityError>,
}

impl CapacityCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            errors: Vec::new(),
        }
    }

    fn denied(errors: Vec<CapacityError>) -> Self {
        Self {
            allowed: false,
            errors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityStats {
    pub location_id: Uuid,
    pub total_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub available_quantity: Decimal,
    pub max_quantity: Option<Decimal>,
    pub remaining_capacity: Option<Decimal>,
    pub utilization_percent: Option<Decimal>,
    pub unique_item_count: usize,
}

/// Enforces location capacity rules and answers capacity queries.
///
/// Quantity totals are aggregated over the location and all of its
/// descendants. The traversal keeps its own visited set, so a cyclic
/// hierarchy fed by a buggy gateway terminates instead of spinning.
pub struct StockCapacityService {
    stock_items: Arc<dyn StockItemRepository>,
    settings: Arc<dyn LocationSettingsRepository>,
    locations: Arc<dyn LocationGateway>,
    catalog: Option<Arc<dyn CatalogGateway>>,
}

impl StockCapacityService {
    pub fn new(
        stock_items: Arc<dyn StockItemRepository>,
        settings: Arc<dyn LocationSettingsRepository>,
        locations: Arc<dyn LocationGateway>,
        catalog: Option<Arc<dyn CatalogGateway>>,
    ) -> Self {
        Self {
            stock_items,
            settings,
            locations,
            catalog,
        }
    }

    /// The location plus every descendant, breadth-first.
    async fn location_tree(&self, location_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([location_id]);
        let mut tree = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            tree.push(current);
            for child in self.locations.children_ids(current).await? {
                queue.push_back(child);
            }
        }
        Ok(tree)
    }

    /// Total on-hand quantity across the location and its descendants.
    #[instrument(skip(self))]
    pub async fn get_total_stock_for_location_tree(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        let mut total = Decimal::ZERO;
        for location in self.location_tree(location_id).await? {
            for item in self
                .stock_items
                .list_by_location(location, workspace_id)
                .await?
            {
                total += item.quantity;
            }
        }
        Ok(total)
    }

    /// Distinct item ids with a balance row anywhere in the location tree.
    pub async fn get_unique_item_ids(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<HashSet<Uuid>, ServiceError> {
        let mut ids = HashSet::new();
        for location in self.location_tree(location_id).await? {
            for item in self
                .stock_items
                .list_by_location(location, workspace_id)
                .await?
            {
                ids.insert(item.item_id);
            }
        }
        Ok(ids)
    }

    /// Remaining quantity the location can take. None means unlimited.
    pub async fn get_available_capacity(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<Decimal>, ServiceError> {
        let settings = self
            .settings
            .find_by_location(location_id, workspace_id)
            .await?;
        match settings.and_then(|s| s.max_quantity) {
            Some(max) => {
                let current = self
                    .get_total_stock_for_location_tree(location_id, workspace_id)
                    .await?;
                Ok(Some((max - current).max(Decimal::ZERO)))
            }
            None => Ok(None),
        }
    }

    pub async fn is_location_full(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        match self.get_available_capacity(location_id, workspace_id).await? {
            Some(remaining) => Ok(remaining <= Decimal::ZERO),
            None => Ok(false),
        }
    }

    /// Checks whether the location can take `quantity` more of `item_id`.
    ///
    /// All violated rules are reported at once. A location without a
    /// settings row accepts anything.
    #[instrument(skip(self))]
    pub async fn can_accept_stock(
        &self,
        location_id: Uuid,
        item_id: Uuid,
        quantity: Decimal,
        workspace_id: Option<Uuid>,
    ) -> Result<CapacityCheck, ServiceError> {
        let settings = match self
            .settings
            .find_by_location(location_id, workspace_id)
            .await?
        {
            Some(settings) => settings,
            None => return Ok(CapacityCheck::allowed()),
        };

        let mut errors = Vec::new();

        if !settings.is_active {
            errors.push(CapacityError {
                code: LOCATION_NOT_ACTIVE.to_string(),
                message: format!("location {} is not accepting stock", location_id),
                context: None,
            });
        }

        if let Some(error) = self
            .check_item_type(&settings, item_id, workspace_id)
            .await?
        {
            errors.push(error);
        }

        if !settings.allow_mixed_skus {
            let mut other_items = self.get_unique_item_ids(location_id, workspace_id).await?;
            other_items.remove(&item_id);
            if !other_items.is_empty() {
                errors.push(CapacityError {
                    code: MIXED_SKUS_NOT_ALLOWED.to_string(),
                    message: format!(
                        "location {} already holds {} other item(s) and does not allow mixed SKUs",
                        location_id,
                        other_items.len()
                    ),
                    context: None,
                });
            }
        }

        if let Some(max) = settings.max_quantity {
            let current = self
                .get_total_stock_for_location_tree(location_id, workspace_id)
                .await?;
            let would_be_total = current + quantity;
            if would_be_total > max {
                errors.push(CapacityError {
                    code: EXCEEDS_MAX_QUANTITY.to_string(),
                    message: format!(
                        "adding {} would bring location {} to {} of a {} maximum",
                        quantity, location_id, would_be_total, max
                    ),
                    context: Some(json!({
                        "current_quantity": current,
                        "requested_quantity": quantity,
                        "max_quantity": max,
                        "would_be_total": would_be_total,
                    })),
                });
            }
        }

        if errors.is_empty() {
            Ok(CapacityCheck::allowed())
        } else {
            Ok(CapacityCheck::denied(errors))
        }
    }

    async fn check_item_type(
        &self,
        settings: &location_stock_settings::Model,
        item_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Option<CapacityError>, ServiceError> {
        if settings.allowed_item_types().is_none() {
            return Ok(None);
        }
        let catalog = match &self.catalog {
            Some(catalog) => catalog,
            // Whitelist configured but no catalog to resolve types against;
            // the existence check in the movement service still applies.
            None => return Ok(None),
        };

        let item_type = catalog
            .get_item(item_id, workspace_id)
            .await?
            .and_then(|item| item.item_type);

        if settings.is_item_type_allowed(item_type.as_deref()) {
            Ok(None)
        } else {
            Ok(Some(CapacityError {
                code: ITEM_TYPE_NOT_ALLOWED.to_string(),
                message: format!(
                    "item type {:?} is not allowed at location {}",
                    item_type, settings.location_id
                ),
                context: Some(json!({
                    "item_id": item_id,
                    "item_type": item_type,
                    "allowed_item_types": settings.allowed_item_types(),
                })),
            }))
        }
    }

    #[instrument(skip(self))]
    pub async fn get_capacity_stats(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<CapacityStats, ServiceError> {
        let mut total_quantity = Decimal::ZERO;
        let mut reserved_quantity = Decimal::ZERO;
        let mut unique_items = HashSet::new();

        for location in self.location_tree(location_id).await? {
            for item in self
                .stock_items
                .list_by_location(location, workspace_id)
                .await?
            {
                total_quantity += item.quantity;
                reserved_quantity += item.reserved_quantity;
                unique_items.insert(item.item_id);
            }
        }

        let settings = self
            .settings
            .find_by_location(location_id, workspace_id)
            .await?;
        let max_quantity = settings.and_then(|s| s.max_quantity);
        let remaining_capacity = max_quantity.map(|max| (max - total_quantity).max(Decimal::ZERO));
        let utilization_percent = max_quantity.and_then(|max| {
            if max > Decimal::ZERO {
                Some(total_quantity / max * Decimal::from(100))
            } else {
                None
            }
        });

        Ok(CapacityStats {
            location_id,
            total_quantity,
            reserved_quantity,
            available_quantity: total_quantity - reserved_quantity,
            max_quantity,
            remaining_capacity,
            utilization_percent,
            unique_item_count: unique_items.len(),
        })
    }
}
