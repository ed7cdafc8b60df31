use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{stock_item, stock_movement, MovementType, StockKey};
use crate::errors::{ServiceError, ValidationResult};
use crate::events::{Event, EventSender};
use crate::gateways::{CatalogGateway, LocationGateway};
use crate::repositories::{LocationSettingsRepository, MovementRepository, StockItemRepository};
use crate::services::movement_handlers::MovementHandlerRegistry;
use crate::services::stock_capacity::StockCapacityService;

/// Outcome of processing one movement. On failure the movement is recorded
/// as failed and no balance was touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: bool,
    pub movement: stock_movement::Model,
    pub stock_item: Option<stock_item::Model>,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub errors: Vec<String>,
}

impl ProcessResult {
    pub fn delta(&self) -> Decimal {
        self.new_balance - self.previous_balance
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub item_id: Uuid,
    pub source_location_id: Uuid,
    pub destination_location_id: Uuid,
    pub quantity: Decimal,
    pub lot_number: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub reason: Option<String>,
    pub performed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub success: bool,
    pub out_movement: stock_movement::Model,
    pub in_movement: Option<stock_movement::Model>,
    pub compensation: Option<stock_movement::Model>,
    pub errors: Vec<String>,
}

/// Per-key mutex table. Serializes writers touching the same balance so
/// the read-validate-write sequence in `process` is atomic per key.
#[derive(Default)]
struct KeyLocks {
    locks: DashMap<StockKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &StockKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the entry for a key nobody else holds. Callers must release
    /// their own `Arc` first, otherwise the entry is kept.
    fn release(&self, key: &StockKey) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Validates and processes stock movements against the ledger.
pub struct StockMovementService {
    stock_items: Arc<dyn StockItemRepository>,
    movements: Arc<dyn MovementRepository>,
    settings: Arc<dyn LocationSettingsRepository>,
    capacity: Arc<StockCapacityService>,
    catalog: Option<Arc<dyn CatalogGateway>>,
    locations: Arc<dyn LocationGateway>,
    handlers: Arc<MovementHandlerRegistry>,
    events: EventSender,
    key_locks: KeyLocks,
    allow_negative_default: bool,
}

impl StockMovementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stock_items: Arc<dyn StockItemRepository>,
        movements: Arc<dyn MovementRepository>,
        settings: Arc<dyn LocationSettingsRepository>,
        capacity: Arc<StockCapacityService>,
        catalog: Option<Arc<dyn CatalogGateway>>,
        locations: Arc<dyn LocationGateway>,
        handlers: Arc<MovementHandlerRegistry>,
        events: EventSender,
        allow_negative_default: bool,
    ) -> Self {
        Self {
            stock_items,
            movements,
            settings,
            capacity,
            catalog,
            locations,
            handlers,
            events,
            key_locks: KeyLocks::default(),
            allow_negative_default,
        }
    }

    fn movement_key(movement: &stock_movement::Model) -> StockKey {
        StockKey {
            item_id: movement.item_id,
            location_id: movement.location_id,
            lot_number: movement.lot_number.clone(),
            workspace_id: movement.workspace_id,
        }
    }

    /// Whether this movement kind may create a balance row that does not
    /// exist yet. Only stock arriving can bootstrap a record.
    fn creates_balance(&self, kind: &MovementType) -> bool {
        match kind {
            MovementType::Custom(key) => self
                .handlers
                .get(key)
                .map(|handler| handler.adds_stock(key))
                .unwrap_or(false),
            other => other.adds_stock(),
        }
    }

    async fn allow_negative(
        &self,
        location_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        let settings = self
            .settings
            .find_by_location(location_id, workspace_id)
            .await?;
        Ok(settings
            .map(|s| s.allow_negative_stock)
            .unwrap_or(self.allow_negative_default))
    }

    async fn collect_errors(
        &self,
        kind: &MovementType,
        movement: &stock_movement::Model,
        existing: Option<&stock_item::Model>,
        allow_negative: bool,
    ) -> Result<Vec<String>, ServiceError> {
        let mut errors = Vec::new();

        if movement.quantity <= Decimal::ZERO {
            errors.push("movement quantity must be positive".to_string());
        }

        match movement.movement_status() {
            Some(status) if status.can_process() => {}
            Some(status) => errors.push(format!(
                "movement is {} and cannot be processed",
                status.as_str()
            )),
            None => errors.push(format!("unknown movement status {:?}", movement.status)),
        }

        if !self.locations.exists(movement.location_id).await? {
            errors.push(format!("location {} does not exist", movement.location_id));
        }

        if let Some(catalog) = &self.catalog {
            if !catalog
                .item_exists(movement.item_id, movement.workspace_id)
                .await?
            {
                errors.push(format!("item {} does not exist", movement.item_id));
            }
        }

        // Outbound and reserve movements may bootstrap a missing record only
        // where negative stock is allowed.
        let negative_bootstrap = allow_negative && (kind.removes_stock() || kind.reserves());
        if existing.is_none() && !self.creates_balance(kind) && !negative_bootstrap {
            errors.push(format!(
                "no stock record for item {} at location {}",
                movement.item_id, movement.location_id
            ));
        }

        if let Some(item) = existing {
            // Expired lots accept no new activity besides releasing what is
            // already reserved.
            let touches_stock =
                kind.adds_stock() || kind.removes_stock() || kind.reserves() || kind.is_custom();
            if touches_stock && item.lot_is_expired(Utc::now()) {
                errors.push(format!(
                    "lot {:?} expired at {:?}",
                    item.lot_number, item.lot_expires_at
                ));
            }
        }

        match kind {
            MovementType::Custom(key) => match self.handlers.get(key) {
                Some(handler) => errors.extend(handler.validate(movement, existing)),
                None => errors.push(format!("no movement handler registered for '{}'", key)),
            },
            kind if kind.removes_stock() => {
                if let Some(item) = existing {
                    if !allow_negative && !item.has_available(movement.quantity) {
                        errors.push(format!(
                            "insufficient available stock: requested {}, available {}",
                            movement.quantity,
                            item.available_quantity()
                        ));
                    }
                }
            }
            MovementType::Reserve => {
                if let Some(item) = existing {
                    if !allow_negative && !item.has_available(movement.quantity) {
                        errors.push(format!(
                            "insufficient available stock to reserve: requested {}, available {}",
                            movement.quantity,
                            item.available_quantity()
                        ));
                    }
                    let settings = self
                        .settings
                        .find_by_location(movement.location_id, movement.workspace_id)
                        .await?;
                    if let Some(max_allowed) =
                        settings.and_then(|s| s.max_reservation_allowed(item.quantity))
                    {
                        if item.reserved_quantity + movement.quantity > max_allowed {
                            errors.push(format!(
                                "reservation would exceed the location cap of {} reserved",
                                max_allowed
                            ));
                        }
                    }
                }
            }
            MovementType::Release => {
                if let Some(item) = existing {
                    if !item.can_release(movement.quantity) {
                        errors.push(format!(
                            "cannot release {}: only {} reserved",
                            movement.quantity, item.reserved_quantity
                        ));
                    }
                }
            }
            kind if kind.adds_stock() => {
                let check = self
                    .capacity
                    .can_accept_stock(
                        movement.location_id,
                        movement.item_id,
                        movement.quantity,
                        movement.workspace_id,
                    )
                    .await?;
                for error in check.errors {
                    errors.push(format!("{}: {}", error.code, error.message));
                }
            }
            _ => {}
        }

        Ok(errors)
    }

    /// Read-only validation of a movement. Same rules as `process`, no
    /// locks taken, nothing written.
    #[instrument(skip(self, movement), fields(movement_id = %movement.id, movement_type = %movement.movement_type))]
    pub async fn validate(
        &self,
        movement: &stock_movement::Model,
    ) -> Result<ValidationResult, ServiceError> {
        let kind = match movement.movement_kind() {
            Some(kind) => kind,
            None => {
                return Ok(ValidationResult::with_error(format!(
                    "unknown movement type {:?}",
                    movement.movement_type
                )))
            }
        };

        let key = Self::movement_key(movement);
        let existing = self.stock_items.find_by_key(&key).await?;
        let allow_negative = self
            .allow_negative(movement.location_id, movement.workspace_id)
            .await?;

        let errors = self
            .collect_errors(&kind, movement, existing.as_ref(), allow_negative)
            .await?;
        let mut result = ValidationResult::valid();
        for error in errors {
            result.add_error(error);
        }
        Ok(result)
    }

    /// Validates and applies one movement atomically for its stock key.
    ///
    /// Failures are recorded in the ledger as failed movements; the balance
    /// is only written when every check passed. A movement that is no longer
    /// pending is already a ledger row and is rejected outright so the
    /// recorded row stays untouched.
    #[instrument(skip(self, movement), fields(movement_id = %movement.id, movement_type = %movement.movement_type, item_id = %movement.item_id))]
    pub async fn process(
        &self,
        movement: stock_movement::Model,
    ) -> Result<ProcessResult, ServiceError> {
        match movement.movement_status() {
            Some(status) if status.can_process() => {}
            _ => {
                return Err(ServiceError::ValidationError(format!(
                    "movement {} is {} and cannot be processed",
                    movement.id, movement.status
                )));
            }
        }

        let kind = match movement.movement_kind() {
            Some(kind) => kind,
            None => {
                let error = format!("unknown movement type {:?}", movement.movement_type);
                let failed = self.movements.save(movement.mark_failed()).await?;
                return Ok(ProcessResult {
                    success: false,
                    movement: failed,
                    stock_item: None,
                    previous_balance: Decimal::ZERO,
                    new_balance: Decimal::ZERO,
                    errors: vec![error],
                });
            }
        };

        let key = Self::movement_key(&movement);
        let lock = self.key_locks.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            self.apply_under_lock(&kind, movement, &key).await
        };
        drop(lock);
        self.key_locks.release(&key);
        result
    }

    async fn apply_under_lock(
        &self,
        kind: &MovementType,
        movement: stock_movement::Model,
        key: &StockKey,
    ) -> Result<ProcessResult, ServiceError> {
        let existing = self.stock_items.find_by_key(key).await?;
        let allow_negative = self
            .allow_negative(movement.location_id, movement.workspace_id)
            .await?;

        let errors = self
            .collect_errors(kind, &movement, existing.as_ref(), allow_negative)
            .await?;

        let previous_balance = existing
            .as_ref()
            .map(|item| item.quantity)
            .unwrap_or(Decimal::ZERO);

        if !errors.is_empty() {
            warn!(errors = ?errors, "Movement rejected");
            let failed = self.movements.save(movement.mark_failed()).await?;
            return Ok(ProcessResult {
                success: false,
                movement: failed,
                stock_item: existing,
                previous_balance,
                new_balance: previous_balance,
                errors,
            });
        }

        let created = existing.is_none();
        let base = existing
            .clone()
            .unwrap_or_else(|| stock_item::Model::new_empty(key));

        let updated = match kind {
            MovementType::Custom(handler_key) => {
                // Registration was checked during validation.
                let handler = self.handlers.get(handler_key).ok_or_else(|| {
                    ServiceError::Configuration(format!(
                        "movement handler '{}' disappeared during processing",
                        handler_key
                    ))
                })?;
                handler.apply(&movement, base)
            }
            kind => {
                let delta = movement.quantity * Decimal::from(kind.quantity_multiplier());
                let reserved_delta =
                    movement.quantity * Decimal::from(kind.reservation_multiplier());
                base.adjust_quantity(delta).adjust_reserved_quantity(reserved_delta)
            }
        };

        if !allow_negative
            && (updated.quantity < Decimal::ZERO || updated.reserved_quantity < Decimal::ZERO)
        {
            let error = format!(
                "movement would drive stock negative ({} on hand, {} reserved)",
                updated.quantity, updated.reserved_quantity
            );
            let failed = self.movements.save(movement.mark_failed()).await?;
            return Ok(ProcessResult {
                success: false,
                movement: failed,
                stock_item: existing,
                previous_balance,
                new_balance: previous_balance,
                errors: vec![error],
            });
        }

        let saved_item = self.stock_items.save(updated).await?;
        let completed = self
            .movements
            .save(movement.mark_completed(saved_item.quantity))
            .await?;

        if created {
            if let Err(e) = self
                .events
                .send(Event::StockItemCreated {
                    stock_item_id: saved_item.id,
                    item_id: saved_item.item_id,
                    location_id: saved_item.location_id,
                })
                .await
            {
                warn!("Failed to send stock item created event: {}", e);
            }
        }
        if let Err(e) = self
            .events
            .send(Event::MovementProcessed {
                movement_id: completed.id,
                movement_type: completed.movement_type.clone(),
                item_id: completed.item_id,
                location_id: completed.location_id,
                delta: saved_item.quantity - previous_balance,
                new_balance: saved_item.quantity,
            })
            .await
        {
            warn!("Failed to send movement processed event: {}", e);
        }

        info!(
            new_balance = %saved_item.quantity,
            "Movement processed"
        );

        Ok(ProcessResult {
            success: true,
            movement: completed,
            stock_item: Some(saved_item.clone()),
            previous_balance,
            new_balance: saved_item.quantity,
            errors: Vec::new(),
        })
    }

    /// Moves stock between two locations as an out leg plus an in leg.
    ///
    /// If the in leg is rejected the out leg is reversed with a
    /// compensating adjustment. A failed compensation escalates as
    /// `CompensationFailed` so the imbalance is never silent.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, quantity = %request.quantity))]
    pub async fn transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferResult, ServiceError> {
        let mut out = stock_movement::Model::new(
            &MovementType::TransferOut,
            request.item_id,
            request.source_location_id,
            request.quantity,
        )
        .with_destination_location(request.destination_location_id)
        .with_workspace(request.workspace_id);
        if let Some(lot) = &request.lot_number {
            out = out.with_lot(lot.clone());
        }
        if let Some(reason) = &request.reason {
            out = out.with_reason(reason.clone());
        }
        if let Some(performed_by) = &request.performed_by {
            out = out.with_performed_by(performed_by.clone());
        }

        let out_result = self.process(out).await?;
        if !out_result.success {
            return Ok(TransferResult {
                success: false,
                out_movement: out_result.movement,
                in_movement: None,
                compensation: None,
                errors: out_result.errors,
            });
        }

        let mut inbound = stock_movement::Model::new(
            &MovementType::TransferIn,
            request.item_id,
            request.destination_location_id,
            request.quantity,
        )
        .with_source_location(request.source_location_id)
        .with_workspace(request.workspace_id);
        if let Some(lot) = &request.lot_number {
            inbound = inbound.with_lot(lot.clone());
        }
        if let Some(reason) = &request.reason {
            inbound = inbound.with_reason(reason.clone());
        }
        if let Some(performed_by) = &request.performed_by {
            inbound = inbound.with_performed_by(performed_by.clone());
        }

        let in_result = self.process(inbound).await?;
        if in_result.success {
            return Ok(TransferResult {
                success: true,
                out_movement: out_result.movement,
                in_movement: Some(in_result.movement),
                compensation: None,
                errors: Vec::new(),
            });
        }

        warn!(
            out_movement_id = %out_result.movement.id,
            errors = ?in_result.errors,
            "Transfer in-leg failed, compensating out-leg"
        );

        let mut compensation = stock_movement::Model::new(
            &MovementType::AdjustmentIn,
            request.item_id,
            request.source_location_id,
            request.quantity,
        )
        .with_reason("transfer compensation")
        .with_reference("transfer_compensation", out_result.movement.id)
        .with_workspace(request.workspace_id);
        if let Some(lot) = &request.lot_number {
            compensation = compensation.with_lot(lot.clone());
        }

        let compensation_result = self.process(compensation).await?;
        if !compensation_result.success {
            return Err(ServiceError::CompensationFailed {
                out_movement_id: out_result.movement.id,
                inbound_errors: in_result.errors,
                compensation_errors: compensation_result.errors,
            });
        }

        if let Err(e) = self
            .events
            .send(Event::TransferCompensated {
                out_movement_id: out_result.movement.id,
                compensation_movement_id: compensation_result.movement.id,
            })
            .await
        {
            warn!("Failed to send transfer compensated event: {}", e);
        }

        Ok(TransferResult {
            success: false,
            out_movement: out_result.movement,
            in_movement: Some(in_result.movement),
            compensation: Some(compensation_result.movement),
            errors: in_result.errors,
        })
    }

    /// Ledger entries for one stock key, oldest first.
    pub async fn movement_history(
        &self,
        key: &StockKey,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.movements.list_for_key(key).await
    }

    pub async fn get_stock_item(
        &self,
        key: &StockKey,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        self.stock_items.find_by_key(key).await
    }
}
