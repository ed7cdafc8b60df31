use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{stock_movement, stock_reservation, MovementType, ReservationStatus, StockKey};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateways::{CatalogGateway, LocationGateway};
use crate::repositories::{
    LocationSettingsRepository, ReservationFilter, ReservationRepository, StockItemRepository,
};
use crate::services::stock_movement::StockMovementService;

/// Result of checking whether a reservation could be taken right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationValidation {
    pub can_reserve: bool,
    pub total_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub available_quantity: Decimal,
    pub max_reservation_allowed: Option<Decimal>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub workspace_id: Option<Uuid>,
    pub reserved_by: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Create straight into `active` (taking stock) instead of `pending`.
    pub activate: bool,
    /// Skip availability validation for an active creation. Manual override
    /// for operators who know better; the stock-side movement still guards
    /// the balance.
    pub skip_validation: bool,
}

impl ReservationRequest {
    pub fn new(item_id: Uuid, location_id: Uuid, quantity: Decimal) -> Self {
        Self {
            item_id,
            location_id,
            quantity,
            workspace_id: None,
            reserved_by: None,
            reference_type: None,
            reference_id: None,
            expires_at: None,
            activate: false,
            skip_validation: false,
        }
    }

    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }
}

/// Outcome of a reservation creation attempt. `reservation` is None when
/// validation rejected the request; nothing was written in that case.
#[derive(Debug, Clone)]
pub struct CreateReservationOutcome {
    pub reservation: Option<stock_reservation::Model>,
    pub validation: ReservationValidation,
}

/// Summary of one expiration sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub expired_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub swept_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub released: usize,
    pub expired: usize,
    pub rejected: usize,
    pub total_active_quantity: Decimal,
}

/// Drives the reservation lifecycle and keeps reserved quantities in step
/// with the ledger via reserve/release movements.
pub struct ReservationService {
    reservations: Arc<dyn ReservationRepository>,
    stock_items: Arc<dyn StockItemRepository>,
    settings: Arc<dyn LocationSettingsRepository>,
    movement_service: Arc<StockMovementService>,
    catalog: Option<Arc<dyn CatalogGateway>>,
    locations: Arc<dyn LocationGateway>,
    events: EventSender,
    strict_approval: bool,
    sweep_batch_size: usize,
    default_ttl_secs: Option<i64>,
    allow_negative_default: bool,
}

impl ReservationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        stock_items: Arc<dyn StockItemRepository>,
        settings: Arc<dyn LocationSettingsRepository>,
        movement_service: Arc<StockMovementService>,
        catalog: Option<Arc<dyn CatalogGateway>>,
        locations: Arc<dyn LocationGateway>,
        events: EventSender,
        strict_approval: bool,
        sweep_batch_size: usize,
        default_ttl_secs: Option<i64>,
        allow_negative_default: bool,
    ) -> Self {
        Self {
            reservations,
            stock_items,
            settings,
            movement_service,
            catalog,
            locations,
            events,
            strict_approval,
            sweep_batch_size,
            default_ttl_secs,
            allow_negative_default,
        }
    }

    /// Checks availability for a prospective reservation without writing
    /// anything. When the location allows negative stock an insufficiency
    /// is downgraded to a warning.
    #[instrument(skip(self))]
    pub async fn validate_reservation(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        workspace_id: Option<Uuid>,
    ) -> Result<ReservationValidation, ServiceError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if quantity <= Decimal::ZERO {
            errors.push("reservation quantity must be positive".to_string());
        }

        if !self.locations.exists(location_id).await? {
            errors.push(format!("location {} does not exist", location_id));
        }

        if let Some(catalog) = &self.catalog {
            if !catalog.item_exists(item_id, workspace_id).await? {
                errors.push(format!("item {} does not exist", item_id));
            }
        }

        let key = StockKey::new(item_id, location_id).with_workspace(workspace_id);
        let item = self.stock_items.find_by_key(&key).await?;

        let settings = self
            .settings
            .find_by_location(location_id, workspace_id)
            .await?;
        let allow_negative = settings
            .as_ref()
            .map(|s| s.allow_negative_stock)
            .unwrap_or(self.allow_negative_default);

        let (total, reserved) = item
            .as_ref()
            .map(|i| (i.quantity, i.reserved_quantity))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let available = total - reserved;
        let max_reservation_allowed = settings
            .as_ref()
            .and_then(|s| s.max_reservation_allowed(total));

        match &item {
            None => {
                if allow_negative {
                    warnings.push(
                        "no stock on hand; location allows negative stock".to_string(),
                    );
                } else {
                    errors.push(format!(
                        "no stock record for item {} at location {}",
                        item_id, location_id
                    ));
                }
            }
            Some(_) if available < quantity => {
                if allow_negative {
                    warnings.push(format!(
                        "requested {} exceeds available {}; location allows negative stock",
                        quantity, available
                    ));
                } else {
                    errors.push(format!(
                        "insufficient available stock: requested {}, available {}",
                        quantity, available
                    ));
                }
            }
            Some(_) => {}
        }

        if let Some(max_allowed) = max_reservation_allowed {
            if reserved + quantity > max_allowed {
                errors.push(format!(
                    "reservation would exceed the location cap of {} reserved",
                    max_allowed
                ));
            }
        }

        Ok(ReservationValidation {
            can_reserve: errors.is_empty(),
            total_quantity: total,
            reserved_quantity: reserved,
            available_quantity: available,
            max_reservation_allowed,
            errors,
            warnings,
        })
    }

    fn reserve_movement(
        reservation: &stock_reservation::Model,
    ) -> stock_movement::Model {
        stock_movement::Model::new(
            &MovementType::Reserve,
            reservation.item_id,
            reservation.location_id,
            reservation.quantity,
        )
        .with_reference("reservation", reservation.id)
        .with_workspace(reservation.workspace_id)
    }

    fn release_movement(
        reservation: &stock_reservation::Model,
        reason: &str,
    ) -> stock_movement::Model {
        stock_movement::Model::new(
            &MovementType::Release,
            reservation.item_id,
            reservation.location_id,
            reservation.quantity,
        )
        .with_reference("reservation", reservation.id)
        .with_reason(reason)
        .with_workspace(reservation.workspace_id)
    }

    /// Creates a reservation. Pending reservations hold no stock; active
    /// ones move `reserved_quantity` through a reserve movement before the
    /// reservation row is saved.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, quantity = %request.quantity, activate = request.activate))]
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<CreateReservationOutcome, ServiceError> {
        let validation = self
            .validate_reservation(
                request.item_id,
                request.location_id,
                request.quantity,
                request.workspace_id,
            )
            .await?;

        if request.activate && !request.skip_validation && !validation.can_reserve {
            return Ok(CreateReservationOutcome {
                reservation: None,
                validation,
            });
        }

        let status = if request.activate {
            ReservationStatus::Active
        } else {
            ReservationStatus::Pending
        };

        let expires_at = request.expires_at.or_else(|| {
            self.default_ttl_secs
                .map(|secs| Utc::now() + Duration::seconds(secs))
        });

        let mut reservation = stock_reservation::Model::new(
            request.item_id,
            request.location_id,
            request.quantity,
            status,
        )
        .with_workspace(request.workspace_id);
        if let Some(reserved_by) = &request.reserved_by {
            reservation = reservation.with_reserved_by(reserved_by.clone());
        }
        if let (Some(reference_type), Some(reference_id)) =
            (&request.reference_type, request.reference_id)
        {
            reservation = reservation.with_reference(reference_type.clone(), reference_id);
        }
        if let Some(expires_at) = expires_at {
            reservation = reservation.with_expires_at(expires_at);
        }

        if request.activate {
            let movement = Self::reserve_movement(&reservation);
            let result = self.movement_service.process(movement).await?;
            if !result.success {
                let mut failed = validation;
                failed.can_reserve = false;
                failed.errors.extend(result.errors);
                return Ok(CreateReservationOutcome {
                    reservation: None,
                    validation: failed,
                });
            }
        }

        let saved = self.reservations.save(reservation).await?;
        if let Err(e) = self
            .events
            .send(Event::ReservationCreated {
                reservation_id: saved.id,
                status: saved.status.clone(),
            })
            .await
        {
            warn!("Failed to send reservation created event: {}", e);
        }

        info!(reservation_id = %saved.id, status = %saved.status, "Reservation created");
        Ok(CreateReservationOutcome {
            reservation: Some(saved),
            validation,
        })
    }

    /// Approves a pending reservation, taking stock for it.
    ///
    /// Availability is re-checked at approval time. By default a failed
    /// re-check only logs a warning (operators may approve into known
    /// shortage); with strict approval it aborts. Either way the reserve
    /// movement is the final authority on the balance.
    #[instrument(skip(self))]
    pub async fn approve_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let reservation = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reservation {}", reservation_id)))?;

        let active = reservation.approve()?;
        let active = self
            .reservations
            .save_transition(ReservationStatus::Pending, active)
            .await?;

        let validation = self
            .validate_reservation(
                active.item_id,
                active.location_id,
                active.quantity,
                active.workspace_id,
            )
            .await?;
        if !validation.can_reserve {
            if self.strict_approval {
                let reverted = active.revert_to_pending()?;
                self.reservations
                    .save_transition(ReservationStatus::Active, reverted)
                    .await?;
                return Err(ServiceError::ValidationError(
                    validation.errors.join("; "),
                ));
            }
            warn!(
                reservation_id = %active.id,
                errors = ?validation.errors,
                "Approving reservation despite failed re-validation"
            );
        }

        let movement = Self::reserve_movement(&active);
        let result = self.movement_service.process(movement).await?;
        if !result.success {
            let reverted = active.revert_to_pending()?;
            self.reservations
                .save_transition(ReservationStatus::Active, reverted)
                .await?;
            return Err(ServiceError::InsufficientStock(result.errors.join("; ")));
        }

        if let Err(e) = self
            .events
            .send(Event::ReservationApproved {
                reservation_id: active.id,
            })
            .await
        {
            warn!("Failed to send reservation approved event: {}", e);
        }

        info!(reservation_id = %active.id, "Reservation approved");
        Ok(active)
    }

    /// Rejects a pending reservation. No stock was held, so this is purely
    /// a status change.
    #[instrument(skip(self, reason))]
    pub async fn reject_reservation(
        &self,
        reservation_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let reservation = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reservation {}", reservation_id)))?;

        let rejected = reservation.reject(reason)?;
        let rejected = self
            .reservations
            .save_transition(ReservationStatus::Pending, rejected)
            .await?;

        if let Err(e) = self
            .events
            .send(Event::ReservationRejected {
                reservation_id: rejected.id,
            })
            .await
        {
            warn!("Failed to send reservation rejected event: {}", e);
        }

        info!(reservation_id = %rejected.id, "Reservation rejected");
        Ok(rejected)
    }

    /// Releases an active reservation, returning its stock to available.
    #[instrument(skip(self))]
    pub async fn release_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let reservation = self
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reservation {}", reservation_id)))?;

        let released = reservation.release()?;
        // Claim the transition first so only one caller releases; revert if
        // the stock-side movement does not go through.
        let released = self
            .reservations
            .save_transition(ReservationStatus::Active, released)
            .await?;

        let movement = Self::release_movement(&reservation, "reservation released");
        let result = self.movement_service.process(movement).await?;
        if !result.success {
            self.reservations
                .save_transition(ReservationStatus::Released, reservation.clone())
                .await?;
            return Err(ServiceError::InvalidOperation(format!(
                "failed to release reserved stock: {}",
                result.errors.join("; ")
            )));
        }

        if let Err(e) = self
            .events
            .send(Event::ReservationReleased {
                reservation_id: Some(released.id),
                item_id: released.item_id,
                location_id: released.location_id,
                quantity: released.quantity,
            })
            .await
        {
            warn!("Failed to send reservation released event: {}", e);
        }

        info!(reservation_id = %released.id, "Reservation released");
        Ok(released)
    }

    /// Releases a raw reserved quantity with no reservation row backing it.
    #[instrument(skip(self))]
    pub async fn release_quantity(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        workspace_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let movement = stock_movement::Model::new(
            &MovementType::Release,
            item_id,
            location_id,
            quantity,
        )
        .with_reason("manual release")
        .with_workspace(workspace_id);

        let result = self.movement_service.process(movement).await?;
        if !result.success {
            return Err(ServiceError::InvalidOperation(format!(
                "failed to release reserved stock: {}",
                result.errors.join("; ")
            )));
        }

        if let Err(e) = self
            .events
            .send(Event::ReservationReleased {
                reservation_id: None,
                item_id,
                location_id,
                quantity,
            })
            .await
        {
            warn!("Failed to send reservation released event: {}", e);
        }
        Ok(())
    }

    /// Expires overdue active reservations, returning their stock.
    ///
    /// One run handles at most the configured batch size. Items claimed by
    /// a concurrent transition are skipped; a failed stock release reverts
    /// that reservation to active and counts as a failure, never aborting
    /// the rest of the batch.
    #[instrument(skip(self))]
    pub async fn expire_reservations(&self) -> Result<CleanupResult, ServiceError> {
        let now = Utc::now();
        let candidates = self
            .reservations
            .find_expired_active(now, self.sweep_batch_size)
            .await?;

        let mut expired_count = 0;
        let mut skipped_count = 0;
        let mut failed_count = 0;

        for reservation in candidates {
            let expired = match reservation.expire() {
                Ok(expired) => expired,
                Err(_) => {
                    skipped_count += 1;
                    continue;
                }
            };

            let expired = match self
                .reservations
                .save_transition(ReservationStatus::Active, expired)
                .await
            {
                Ok(expired) => expired,
                Err(ServiceError::ConcurrentModification(_)) => {
                    skipped_count += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let movement = Self::release_movement(&reservation, "reservation expired");
            let result = self.movement_service.process(movement).await?;
            if !result.success {
                warn!(
                    reservation_id = %reservation.id,
                    errors = ?result.errors,
                    "Failed to release stock for expired reservation, reverting"
                );
                self.reservations
                    .save_transition(ReservationStatus::Expired, expired.revert_to_active()?)
                    .await?;
                failed_count += 1;
                continue;
            }

            if let Err(e) = self
                .events
                .send(Event::ReservationExpired {
                    reservation_id: reservation.id,
                })
                .await
            {
                warn!("Failed to send reservation expired event: {}", e);
            }
            expired_count += 1;
        }

        let result = CleanupResult {
            expired_count,
            skipped_count,
            failed_count,
            swept_at: now,
        };
        info!(
            expired = result.expired_count,
            skipped = result.skipped_count,
            failed = result.failed_count,
            "Reservation expiration sweep finished"
        );
        Ok(result)
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<stock_reservation::Model>, ServiceError> {
        self.reservations.find_by_id(reservation_id).await
    }

    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        self.reservations.list(filter).await
    }

    /// Aggregated counts by status for reservations matching the filter's
    /// item/location/workspace fields. The filter's own status field is
    /// ignored.
    pub async fn reservation_stats(
        &self,
        filter: &ReservationFilter,
    ) -> Result<ReservationStats, ServiceError> {
        let all = ReservationFilter {
            status: None,
            ..filter.clone()
        };
        let mut stats = ReservationStats::default();
        for reservation in self.reservations.list(&all).await? {
            stats.total += 1;
            match reservation.reservation_status() {
                Some(ReservationStatus::Pending) => stats.pending += 1,
                Some(ReservationStatus::Active) => {
                    stats.active += 1;
                    stats.total_active_quantity += reservation.quantity;
                }
                Some(ReservationStatus::Released) => stats.released += 1,
                Some(ReservationStatus::Expired) => stats.expired += 1,
                Some(ReservationStatus::Rejected) => stats.rejected += 1,
                None => {}
            }
        }
        Ok(stats)
    }
}
