//! Available-inventory projection.
//!
//! Pure read model over the per-(product, variant, location) level row:
//! available = on hand minus the unreleased portion of active holds. Always
//! recomputed at read time; nothing here mutates state.

use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::config::ReservationSettings;
use crate::entities::inventory_level::{self, Entity as InventoryLevelEntity};
use crate::errors::ServiceError;

/// Snapshot of availability for one (product, variant, location) tuple.
///
/// `record_found == false` means no on-hand row exists at that location;
/// callers treat this as zero available, not as a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableInventory {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub location_id: Uuid,
    pub quantity_on_hand: i32,
    pub quantity_reserved: i32,
    pub available_quantity: i32,
    pub record_found: bool,
}

/// Outcome of an availability check for a requested quantity.
///
/// Shortfalls land in `errors` (and flip `is_valid`); low-headroom signals
/// land in `warnings` and leave the validation passing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub available_quantity: i32,
    pub requested_quantity: i32,
}

/// Read-only projection service over inventory levels.
#[derive(Clone)]
pub struct AvailabilityService {
    db: Arc<DatabaseConnection>,
    settings: ReservationSettings,
}

impl AvailabilityService {
    pub fn new(db: Arc<DatabaseConnection>, settings: ReservationSettings) -> Self {
        Self { db, settings }
    }

    /// Looks up the level row for one (product, variant, location) tuple.
    /// An absent `variant_id` means the base product, not "any variant".
    pub(crate) async fn find_level<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        location_id: Uuid,
    ) -> Result<Option<inventory_level::Model>, ServiceError> {
        let mut query = InventoryLevelEntity::find()
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .filter(inventory_level::Column::LocationId.eq(location_id));

        query = match variant_id {
            Some(variant) => query.filter(inventory_level::Column::VariantId.eq(variant)),
            None => query.filter(inventory_level::Column::VariantId.is_null()),
        };

        query.one(db).await.map_err(ServiceError::db_error)
    }

    /// Returns the current availability snapshot, recomputed from the level
    /// row at call time.
    #[instrument(skip(self))]
    pub async fn get_available(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        location_id: Uuid,
    ) -> Result<AvailableInventory, ServiceError> {
        let level = Self::find_level(&*self.db, product_id, variant_id, location_id).await?;

        Ok(match level {
            Some(level) => AvailableInventory {
                product_id,
                variant_id,
                location_id,
                quantity_on_hand: level.quantity_on_hand,
                quantity_reserved: level.quantity_reserved,
                available_quantity: level.available_quantity(),
                record_found: true,
            },
            None => AvailableInventory {
                product_id,
                variant_id,
                location_id,
                quantity_on_hand: 0,
                quantity_reserved: 0,
                available_quantity: 0,
                record_found: false,
            },
        })
    }

    /// Checks whether `requested_quantity` can be reserved right now.
    #[instrument(skip(self))]
    pub async fn validate_availability(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        location_id: Uuid,
        requested_quantity: i32,
    ) -> Result<AvailabilityValidation, ServiceError> {
        let available = self
            .get_available(product_id, variant_id, location_id)
            .await?;

        Ok(evaluate_availability(
            available.available_quantity,
            requested_quantity,
            self.settings.low_stock_warning_factor,
        ))
    }
}

/// Pure evaluation of an availability check, shared with the ledger's
/// in-transaction re-check.
pub(crate) fn evaluate_availability(
    available_quantity: i32,
    requested_quantity: i32,
    low_stock_warning_factor: f64,
) -> AvailabilityValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if requested_quantity <= 0 {
        errors.push(format!(
            "Requested quantity must be positive, got {}",
            requested_quantity
        ));
    } else if available_quantity < requested_quantity {
        errors.push(format!(
            "Insufficient stock: requested {}, only {} available",
            requested_quantity, available_quantity
        ));
    } else if (available_quantity as f64) < (requested_quantity as f64) * low_stock_warning_factor {
        warnings.push(format!(
            "Low stock headroom: requested {}, only {} available",
            requested_quantity, available_quantity
        ));
    }

    AvailabilityValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        available_quantity,
        requested_quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_fails_on_shortfall() {
        let result = evaluate_availability(3, 5, 1.2);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("requested 5"));
        assert!(result.errors[0].contains("3 available"));
    }

    #[test]
    fn validation_warns_on_low_headroom() {
        // 10 requested, 11 available: passes but below the 20% buffer.
        let result = evaluate_availability(11, 10, 1.2);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn validation_clean_with_headroom() {
        let result = evaluate_availability(12, 10, 1.2);
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn validation_rejects_non_positive_request() {
        let result = evaluate_availability(10, 0, 1.2);
        assert!(!result.is_valid);
        let result = evaluate_availability(10, -4, 1.2);
        assert!(!result.is_valid);
    }

    #[test]
    fn exact_match_is_valid_with_warning() {
        let result = evaluate_availability(10, 10, 1.2);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
