use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an inventory reservation.
///
/// `Active`, `Partial` and `Fulfilled` are derived from the quantity pair
/// via [`ReservationStatus::derive`]; `Cancelled` and `Expired` are explicit
/// terminal overrides. Status is never stored independently of a quantity
/// change, so status and quantities cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    Partial,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Partial => "partial",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReservationStatus::Active),
            "partial" => Some(ReservationStatus::Partial),
            "fulfilled" => Some(ReservationStatus::Fulfilled),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    /// Computes the status implied by the quantity pair.
    ///
    /// Requires `0 <= released <= reserved`; callers enforce that bound
    /// before any write.
    pub fn derive(released_quantity: i32, reserved_quantity: i32) -> Self {
        if released_quantity == reserved_quantity {
            ReservationStatus::Fulfilled
        } else if released_quantity > 0 {
            ReservationStatus::Partial
        } else {
            ReservationStatus::Active
        }
    }

    /// Terminal statuses accept no further quantity or status changes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled | ReservationStatus::Cancelled | ReservationStatus::Expired
        )
    }

    /// Whether the reservation still holds stock against availability.
    pub fn holds_stock(&self) -> bool {
        matches!(self, ReservationStatus::Active | ReservationStatus::Partial)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-readable identifier, format `RES-YYYYMMDD-NNNNN`, unique.
    #[sea_orm(unique)]
    pub reservation_number: String,
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub location_id: Uuid,
    /// Original hold size; immutable once set.
    pub reserved_quantity: i32,
    /// Cumulative released amount; monotone, never exceeds `reserved_quantity`.
    pub released_quantity: i32,
    pub status: String,
    pub reference_type: String,
    pub reference_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub reserved_for: Option<String>,
    /// Tie-break ordering for callers; higher served first. Not enforced here.
    pub priority: i32,
    pub auto_release: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub fulfilled_by: Option<Uuid>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency column; every mutation is a compare-and-swap.
    pub version: i32,
}

impl Model {
    pub fn status_enum(&self) -> Option<ReservationStatus> {
        ReservationStatus::from_str(&self.status)
    }

    /// Quantity still held against available inventory.
    pub fn outstanding_quantity(&self) -> i32 {
        self.reserved_quantity - self.released_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::reservation_movement::Entity")]
    Movements,
}

impl Related<super::reservation_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);

            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }

        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}
