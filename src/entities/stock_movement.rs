use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use async_trait::async_trait;

/// The closed set of movement kinds the engine understands.
///
/// Quantity magnitudes are always positive; the kind decides the sign
/// applied to the stock balance. `Custom` carries the handler key that a
/// registered `MovementHandler` resolves the semantics for; on disk the key
/// lives in the movement's `reference_type` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    // Inbound
    Receipt,
    Return,
    AdjustmentIn,
    TransferIn,
    Production,
    // Outbound
    Shipment,
    Consumption,
    AdjustmentOut,
    TransferOut,
    Damage,
    Expiration,
    Installation,
    // Reservation bookkeeping
    Reserve,
    Release,
    // Neutral
    Count,
    Relocation,
    // Handler-defined
    Custom(String),
}

impl MovementType {
    pub fn as_str(&self) -> &str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Return => "return",
            MovementType::AdjustmentIn => "adjustment_in",
            MovementType::TransferIn => "transfer_in",
            MovementType::Production => "production",
            MovementType::Shipment => "shipment",
            MovementType::Consumption => "consumption",
            MovementType::AdjustmentOut => "adjustment_out",
            MovementType::TransferOut => "transfer_out",
            MovementType::Damage => "damage",
            MovementType::Expiration => "expiration",
            MovementType::Installation => "installation",
            MovementType::Reserve => "reserve",
            MovementType::Release => "release",
            MovementType::Count => "count",
            MovementType::Relocation => "relocation",
            MovementType::Custom(_) => "custom",
        }
    }

    /// Resolves the stored `movement_type` column back to a kind. Custom
    /// movements store the handler key in `reference_type`, which must be
    /// present for them to parse.
    pub fn parse(type_str: &str, reference_type: Option<&str>) -> Option<Self> {
        match type_str {
            "receipt" => Some(MovementType::Receipt),
            "return" => Some(MovementType::Return),
            "adjustment_in" => Some(MovementType::AdjustmentIn),
            "transfer_in" => Some(MovementType::TransferIn),
            "production" => Some(MovementType::Production),
            "shipment" => Some(MovementType::Shipment),
            "consumption" => Some(MovementType::Consumption),
            "adjustment_out" => Some(MovementType::AdjustmentOut),
            "transfer_out" => Some(MovementType::TransferOut),
            "damage" => Some(MovementType::Damage),
            "expiration" => Some(MovementType::Expiration),
            "installation" => Some(MovementType::Installation),
            "reserve" => Some(MovementType::Reserve),
            "release" => Some(MovementType::Release),
            "count" => Some(MovementType::Count),
            "relocation" => Some(MovementType::Relocation),
            "custom" => reference_type.map(|key| MovementType::Custom(key.to_string())),
            _ => None,
        }
    }

    pub fn adds_stock(&self) -> bool {
        matches!(
            self,
            MovementType::Receipt
                | MovementType::Return
                | MovementType::AdjustmentIn
                | MovementType::TransferIn
                | MovementType::Production
        )
    }

    pub fn removes_stock(&self) -> bool {
        matches!(
            self,
            MovementType::Shipment
                | MovementType::Consumption
                | MovementType::AdjustmentOut
                | MovementType::TransferOut
                | MovementType::Damage
                | MovementType::Expiration
                | MovementType::Installation
        )
    }

    pub fn reserves(&self) -> bool {
        matches!(self, MovementType::Reserve)
    }

    pub fn releases(&self) -> bool {
        matches!(self, MovementType::Release)
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, MovementType::Count | MovementType::Relocation)
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, MovementType::TransferIn | MovementType::TransferOut)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, MovementType::Custom(_))
    }

    /// Sign applied to the on-hand quantity. Reservation kinds and neutral
    /// kinds leave the balance untouched.
    pub fn quantity_multiplier(&self) -> i64 {
        if self.adds_stock() {
            1
        } else if self.removes_stock() {
            -1
        } else {
            0
        }
    }

    /// Sign applied to the reserved quantity.
    pub fn reservation_multiplier(&self) -> i64 {
        match self {
            MovementType::Reserve => 1,
            MovementType::Release => -1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Pending => "pending",
            MovementStatus::Completed => "completed",
            MovementStatus::Failed => "failed",
            MovementStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MovementStatus::Pending),
            "completed" => Some(MovementStatus::Completed),
            "failed" => Some(MovementStatus::Failed),
            "cancelled" => Some(MovementStatus::Cancelled),
            _ => None,
        }
    }

    /// Only pending movements are eligible for processing.
    pub fn can_process(&self) -> bool {
        matches!(self, MovementStatus::Pending)
    }
}

/// An entry in the movement ledger.
///
/// Movements are append-only; once completed or failed they are never
/// edited. The `quantity` column is the positive magnitude and
/// `balance_after` is stamped on completion for audit reads.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub movement_type: String,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub lot_number: Option<String>,
    pub source_location_id: Option<Uuid>,
    pub destination_location_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub status: String,
    pub balance_after: Option<Decimal>,
    pub performed_by: Option<String>,
    pub workspace_id: Option<Uuid>,
    #[sea_orm(column_type = "Json", nullable)]
    pub meta: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
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
    pub fn new(kind: &MovementType, item_id: Uuid, location_id: Uuid, quantity: Decimal) -> Self {
        let reference_type = match kind {
            MovementType::Custom(key) => Some(key.clone()),
            _ => None,
        };
        Self {
            id: Uuid::new_v4(),
            movement_type: kind.as_str().to_string(),
            item_id,
            location_id,
            quantity,
            lot_number: None,
            source_location_id: None,
            destination_location_id: None,
            reference_type,
            reference_id: None,
            reason: None,
            status: MovementStatus::Pending.as_str().to_string(),
            balance_after: None,
            performed_by: None,
            workspace_id: None,
            meta: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn with_lot(mut self, lot_number: impl Into<String>) -> Self {
        self.lot_number = Some(lot_number.into());
        self
    }

    pub fn with_reference(mut self, reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_workspace(mut self, workspace_id: Option<Uuid>) -> Self {
        self.workspace_id = workspace_id;
        self
    }

    pub fn with_meta(mut self, meta: Json) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_performed_by(mut self, performed_by: impl Into<String>) -> Self {
        self.performed_by = Some(performed_by.into());
        self
    }

    pub fn with_source_location(mut self, location_id: Uuid) -> Self {
        self.source_location_id = Some(location_id);
        self
    }

    pub fn with_destination_location(mut self, location_id: Uuid) -> Self {
        self.destination_location_id = Some(location_id);
        self
    }

    pub fn movement_kind(&self) -> Option<MovementType> {
        MovementType::parse(&self.movement_type, self.reference_type.as_deref())
    }

    pub fn movement_status(&self) -> Option<MovementStatus> {
        MovementStatus::from_str(&self.status)
    }

    pub fn mark_completed(&self, balance_after: Decimal) -> Self {
        let mut next = self.clone();
        next.status = MovementStatus::Completed.as_str().to_string();
        next.balance_after = Some(balance_after);
        next.processed_at = Some(Utc::now());
        next
    }

    pub fn mark_failed(&self) -> Self {
        let mut next = self.clone();
        next.status = MovementStatus::Failed.as_str().to_string();
        next.processed_at = Some(Utc::now());
        next
    }
}
