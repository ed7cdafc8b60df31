use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;

use crate::errors::ServiceError;

/// Reservation lifecycle.
///
/// ```text
/// pending --approve--> active --release--> released
///    |                   |
///    +--reject--> rejected  +--expire--> expired
/// ```
///
/// `released`, `expired` and `rejected` are terminal; transitions out of
/// them fail with `InvalidStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Active,
    Released,
    Expired,
    Rejected,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Active => "active",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "active" => Some(ReservationStatus::Active),
            "released" => Some(ReservationStatus::Released),
            "expired" => Some(ReservationStatus::Expired),
            "rejected" => Some(ReservationStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Released | ReservationStatus::Expired | ReservationStatus::Rejected
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub status: String,
    pub reserved_by: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub workspace_id: Option<Uuid>,
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
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}

impl Model {
    pub fn new(
        item_id: Uuid,
        location_id: Uuid,
        quantity: Decimal,
        status: ReservationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            location_id,
            quantity,
            status: status.as_str().to_string(),
            reserved_by: None,
            reference_type: None,
            reference_id: None,
            expires_at: None,
            created_at: Utc::now(),
            released_at: None,
            rejection_reason: None,
            workspace_id: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_reserved_by(mut self, reserved_by: impl Into<String>) -> Self {
        self.reserved_by = Some(reserved_by.into());
        self
    }

    pub fn with_reference(mut self, reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_workspace(mut self, workspace_id: Option<Uuid>) -> Self {
        self.workspace_id = workspace_id;
        self
    }

    pub fn reservation_status(&self) -> Option<ReservationStatus> {
        ReservationStatus::from_str(&self.status)
    }

    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        self.reservation_status() == Some(ReservationStatus::Active)
            && self.expires_at.map(|at| at <= as_of).unwrap_or(false)
    }

    fn require_status(&self, expected: ReservationStatus) -> Result<(), ServiceError> {
        match self.reservation_status() {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(ServiceError::InvalidStatus(format!(
                "reservation {} is {}, expected {}",
                self.id,
                actual.as_str(),
                expected.as_str()
            ))),
            None => Err(ServiceError::InvalidStatus(format!(
                "reservation {} has unknown status {:?}",
                self.id, self.status
            ))),
        }
    }

    pub fn approve(&self) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Pending)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Active.as_str().to_string();
        Ok(next)
    }

    pub fn reject(&self, reason: impl Into<String>) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Pending)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Rejected.as_str().to_string();
        next.rejection_reason = Some(reason.into());
        Ok(next)
    }

    pub fn release(&self) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Active)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Released.as_str().to_string();
        next.released_at = Some(Utc::now());
        Ok(next)
    }

    pub fn expire(&self) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Active)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Expired.as_str().to_string();
        next.released_at = Some(Utc::now());
        Ok(next)
    }

    /// Puts an active reservation back to pending. Used to undo an approval
    /// whose stock-side movement failed.
    pub fn revert_to_pending(&self) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Active)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Pending.as_str().to_string();
        Ok(next)
    }

    /// Puts an expired reservation back to active. Used when the sweep's
    /// release movement fails and the expiry must be undone.
    pub fn revert_to_active(&self) -> Result<Self, ServiceError> {
        self.require_status(ReservationStatus::Expired)?;
        let mut next = self.clone();
        next.status = ReservationStatus::Active.as_str().to_string();
        next.released_at = None;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn pending() -> Model {
        Model::new(Uuid::new_v4(), Uuid::new_v4(), dec!(5), ReservationStatus::Pending)
    }

    #[test]
    fn happy_path_pending_to_released() {
        let reservation = pending();
        let active = reservation.approve().unwrap();
        assert_eq!(active.reservation_status(), Some(ReservationStatus::Active));

        let released = active.release().unwrap();
        assert_eq!(released.reservation_status(), Some(ReservationStatus::Released));
        assert!(released.released_at.is_some());
    }

    #[test]
    fn terminal_states_refuse_transitions() {
        let rejected = pending().reject("no stock").unwrap();
        assert_matches!(rejected.approve(), Err(ServiceError::InvalidStatus(_)));
        assert_matches!(rejected.release(), Err(ServiceError::InvalidStatus(_)));

        let released = pending().approve().unwrap().release().unwrap();
        assert_matches!(released.release(), Err(ServiceError::InvalidStatus(_)));
        assert_matches!(released.expire(), Err(ServiceError::InvalidStatus(_)));
    }

    #[test]
    fn cannot_release_a_pending_reservation() {
        assert_matches!(pending().release(), Err(ServiceError::InvalidStatus(_)));
    }

    #[test]
    fn expiry_applies_only_to_active_with_past_deadline() {
        let now = Utc::now();
        let active = pending()
            .with_expires_at(now - Duration::minutes(1))
            .approve()
            .unwrap();
        assert!(active.is_expired(now));

        let unexpired = pending()
            .with_expires_at(now + Duration::minutes(10))
            .approve()
            .unwrap();
        assert!(!unexpired.is_expired(now));

        let no_deadline = pending().approve().unwrap();
        assert!(!no_deadline.is_expired(now));
    }

    #[test]
    fn revert_paths_are_status_guarded() {
        let active = pending().approve().unwrap();
        let back = active.revert_to_pending().unwrap();
        assert_eq!(back.reservation_status(), Some(ReservationStatus::Pending));

        let expired = pending().approve().unwrap().expire().unwrap();
        let reactivated = expired.revert_to_active().unwrap();
        assert_eq!(reactivated.reservation_status(), Some(ReservationStatus::Active));
        assert!(reactivated.released_at.is_none());

        assert_matches!(back.revert_to_pending(), Err(ServiceError::InvalidStatus(_)));
    }
}
