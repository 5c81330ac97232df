//! Movement log reconciliation.
//!
//! The reservation row is authoritative over the movement log; if the two
//! ever diverge (a partial failure, a manual data fix), user operations keep
//! succeeding and this out-of-band sweep detects and repairs the gap. For
//! any reservation that has left the active pool the log's `RELEASE` sum
//! must equal the reserved quantity; for fulfilled and partial holds it must
//! equal the released quantity.

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::reservation::{self, Entity as ReservationEntity, ReservationStatus};
use crate::entities::reservation_movement::{self, Entity as MovementEntity, MovementType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// A detected divergence between a reservation row and its movement log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementGap {
    pub reservation_id: Uuid,
    pub reservation_number: String,
    /// Release quantity the log should contain for this reservation.
    pub expected_released: i32,
    /// Release quantity the log actually contains.
    pub logged_released: i32,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub gaps: Vec<MovementGap>,
    pub repaired: usize,
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Scans an organization's reservations for movement log gaps.
    #[instrument(skip(self))]
    pub async fn verify(&self, organization_id: Uuid) -> Result<ReconciliationReport, ServiceError> {
        self.run(organization_id, false).await
    }

    /// Scans and appends corrective `RELEASE` movements for every gap found.
    #[instrument(skip(self))]
    pub async fn verify_and_repair(
        &self,
        organization_id: Uuid,
    ) -> Result<ReconciliationReport, ServiceError> {
        self.run(organization_id, true).await
    }

    async fn run(
        &self,
        organization_id: Uuid,
        repair: bool,
    ) -> Result<ReconciliationReport, ServiceError> {
        let reservations = ReservationEntity::find()
            .filter(reservation::Column::OrganizationId.eq(organization_id))
            .all(&*self.db)
            .await?;

        let checked = reservations.len();
        let mut gaps = Vec::new();
        let mut repaired = 0usize;

        for res in reservations {
            let expected_released = match res.status_enum() {
                Some(ReservationStatus::Cancelled) | Some(ReservationStatus::Expired) => {
                    res.reserved_quantity
                }
                Some(_) => res.released_quantity,
                None => continue,
            };

            let movements = MovementEntity::find()
                .filter(reservation_movement::Column::ReservationId.eq(res.id))
                .all(&*self.db)
                .await?;
            let logged_released: i32 = movements
                .iter()
                .filter(|m| MovementType::from_str(&m.movement_type) == Some(MovementType::Release))
                .map(|m| m.quantity)
                .sum();

            if logged_released == expected_released {
                continue;
            }

            warn!(
                reservation_id = %res.id,
                reservation_number = %res.reservation_number,
                expected_released = expected_released,
                logged_released = logged_released,
                "Movement log diverges from reservation row"
            );
            self.event_sender
                .send_or_log(Event::MovementLogGap {
                    reservation_id: res.id,
                    expected_released,
                    logged_released,
                })
                .await;

            if repair && logged_released < expected_released {
                let missing = expected_released - logged_released;
                reservation_movement::ActiveModel {
                    reservation_id: Set(res.id),
                    movement_type: Set(MovementType::Release.as_str().to_string()),
                    product_id: Set(res.product_id),
                    variant_id: Set(res.variant_id),
                    location_id: Set(res.location_id),
                    quantity: Set(missing),
                    idempotency_key: Set(None),
                    notes: Set(Some("reconciliation repair".to_string())),
                    created_by: Set(None),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
                repaired += 1;
            }

            gaps.push(MovementGap {
                reservation_id: res.id,
                reservation_number: res.reservation_number.clone(),
                expected_released,
                logged_released,
            });
        }

        info!(
            organization_id = %organization_id,
            checked = checked,
            gaps = gaps.len(),
            repaired = repaired,
            "Reconciliation pass complete"
        );

        Ok(ReconciliationReport {
            checked,
            gaps,
            repaired,
        })
    }
}
