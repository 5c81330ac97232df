//! Sales order status orchestrator.
//!
//! Drives an order through its status state machine and, on the transitions
//! that matter to inventory, asks the reservation ledger to issue or revoke
//! the holds backing the order's line items. Confirmation reserves item by
//! item: each attempt is independent and reported per item, so an order can
//! end up partially reserved and the caller is told exactly which items were
//! skipped or failed.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::ReservationSettings;
use crate::entities::reservation;
use crate::entities::sales_order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::sales_order_item::{self, Entity as OrderItemEntity};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::reservations::{CreateReservationRequest, ReservationService};
use crate::services::RequestContext;

/// Priority assigned to holds created by order confirmation.
const ORDER_RESERVATION_PRIORITY: i32 = 1;
const ORDER_REFERENCE_TYPE: &str = "sales_order";

/// Allowed outgoing transitions per status. `Fulfilled` and `Cancelled` are
/// terminal and have no outgoing edges.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Draft => &[OrderStatus::Pending, OrderStatus::Cancelled],
        OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
        OrderStatus::Confirmed => &[OrderStatus::Processing, OrderStatus::Cancelled],
        OrderStatus::Processing => &[OrderStatus::Fulfilled, OrderStatus::Cancelled],
        OrderStatus::Fulfilled | OrderStatus::Cancelled => &[],
    }
}

/// Per-item outcome of an order confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemOutcome {
    /// A hold was created and stored on the item.
    Reserved { reservation_id: Uuid },
    /// The item was not eligible (e.g. no location assigned); the transition
    /// still succeeded.
    Skipped { reason: String },
    /// The item's hold was revoked by order cancellation.
    Cancelled { reservation_id: Uuid },
    /// The reservation attempt failed; other items are unaffected.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReservationResult {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub outcome: ItemOutcome,
}

/// Result of a status transition, including the per-item reservation report
/// for transitions into `confirmed` or `cancelled`.
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order: sales_order::Model,
    pub item_results: Vec<ItemReservationResult>,
}

/// Request to create a draft order with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub order_number: String,
    #[validate(length(min = 1))]
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    /// Items without a location are skipped at confirmation, not failed.
    pub location_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    reservations: ReservationService,
    settings: ReservationSettings,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        reservations: ReservationService,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            db,
            reservations,
            settings,
        }
    }

    /// Creates a draft order with its items.
    #[instrument(skip(self, request, ctx), fields(order_number = %request.order_number))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        ctx: &RequestContext,
    ) -> Result<(sales_order::Model, Vec<sales_order_item::Model>), ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid order request: {}", e)))?;
        for item in &request.items {
            item.validate().map_err(|e| {
                ServiceError::ValidationError(format!("Invalid order item: {}", e))
            })?;
        }

        let order = sales_order::ActiveModel {
            order_number: Set(request.order_number.clone()),
            organization_id: Set(request.organization_id),
            branch_id: Set(request.branch_id),
            status: Set(OrderStatus::Draft.as_str().to_string()),
            created_by: Set(ctx.user_id),
            version: Set(1),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let model = sales_order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                location_id: Set(item.location_id),
                quantity: Set(item.quantity),
                quantity_fulfilled: Set(0),
                reservation_id: Set(None),
                ..Default::default()
            }
            .insert(&*self.db)
            .await?;
            items.push(model);
        }

        info!(order_id = %order.id, item_count = items.len(), "Sales order created");
        Ok((order, items))
    }

    /// Gets the current status of an order.
    #[instrument(skip(self))]
    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = self.find_order(order_id).await?;
        order.status_enum().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Order {} has unknown status '{}'",
                order_id, order.status
            ))
        })
    }

    /// Items of an order, in insertion order.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<sales_order_item::Model>, ServiceError> {
        OrderItemEntity::find()
            .filter(sales_order_item::Column::OrderId.eq(order_id))
            .order_by_asc(sales_order_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Transitions an order to `target`, enforcing the state machine.
    ///
    /// Into `confirmed`: creates one reservation per eligible item and stores
    /// its id back on the item. Into `cancelled`: cancels every active hold
    /// referencing the order. Any other allowed edge only changes status.
    #[instrument(skip(self, reason, ctx), fields(order_id = %order_id, target = target.as_str()))]
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        reason: Option<String>,
        ctx: &RequestContext,
    ) -> Result<OrderTransition, ServiceError> {
        let mut attempt = 0u32;
        let (order, current) = loop {
            match self.try_update_status(order_id, target, &reason).await {
                Err(ServiceError::ConcurrencyConflict(id))
                    if attempt < self.settings.conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        order_id = %id,
                        attempt = attempt,
                        "Order status update conflicted; retrying"
                    );
                }
                Err(e) => return Err(e),
                Ok(outcome) => break outcome,
            }
        };

        info!(
            order_id = %order_id,
            old_status = current.as_str(),
            new_status = target.as_str(),
            "Order status updated"
        );
        self.reservations_event_sender()
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.as_str().to_string(),
                new_status: target.as_str().to_string(),
            })
            .await;

        let item_results = match target {
            OrderStatus::Confirmed => self.reserve_order_items(&order, ctx).await?,
            OrderStatus::Cancelled => {
                self.cancel_order_reservations(
                    order_id,
                    reason.as_deref().unwrap_or("order cancelled"),
                    ctx,
                )
                .await?
            }
            _ => Vec::new(),
        };

        let updated = self.find_order(order_id).await?;
        Ok(OrderTransition {
            order: updated,
            item_results,
        })
    }

    /// One fetch-validate-CAS attempt at the status update. A conflict means
    /// the row moved underneath us; the caller retries against the fresh
    /// status, so a lost race resolves to `InvalidTransition` rather than a
    /// spurious conflict error.
    async fn try_update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        reason: &Option<String>,
    ) -> Result<(sales_order::Model, OrderStatus), ServiceError> {
        let order = self.find_order(order_id).await?;
        let current = order.status_enum().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Order {} has unknown status '{}'",
                order_id, order.status
            ))
        })?;

        if !allowed_transitions(current).contains(&target) {
            return Err(ServiceError::InvalidTransition {
                from: current.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let mut update = OrderEntity::update_many()
            .col_expr(sales_order::Column::Status, Expr::value(target.as_str()))
            .col_expr(sales_order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                sales_order::Column::Version,
                Expr::col(sales_order::Column::Version).add(1),
            );
        if target == OrderStatus::Cancelled {
            update = update.col_expr(
                sales_order::Column::CancellationReason,
                Expr::value(reason.clone().unwrap_or_else(|| "order cancelled".to_string())),
            );
        }
        let result = update
            .filter(sales_order::Column::Id.eq(order_id))
            .filter(sales_order::Column::Version.eq(order.version))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(order_id));
        }

        Ok((order, current))
    }

    /// Reserves stock for every eligible item of a freshly-confirmed order.
    /// Each attempt is independent; the transition has already committed.
    async fn reserve_order_items(
        &self,
        order: &sales_order::Model,
        ctx: &RequestContext,
    ) -> Result<Vec<ItemReservationResult>, ServiceError> {
        let items = self.list_items(order.id).await?;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let location_id = match item.location_id {
                Some(location_id) => location_id,
                None => {
                    info!(
                        order_id = %order.id,
                        item_id = %item.id,
                        "Order item has no location; skipping reservation"
                    );
                    results.push(ItemReservationResult {
                        item_id: item.id,
                        product_id: item.product_id,
                        outcome: ItemOutcome::Skipped {
                            reason: "no location assigned".to_string(),
                        },
                    });
                    continue;
                }
            };

            let request = CreateReservationRequest {
                organization_id: order.organization_id,
                branch_id: order.branch_id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                location_id,
                quantity: item.quantity,
                reference_type: ORDER_REFERENCE_TYPE.to_string(),
                reference_id: Some(order.id),
                reference_number: Some(order.order_number.clone()),
                reserved_for: None,
                priority: ORDER_RESERVATION_PRIORITY,
                // Confirmed-order holds never expire on their own; they are
                // released by fulfillment or cancellation.
                auto_release: false,
                expires_at: None,
            };

            let outcome = match self.reservations.create_reservation(request, ctx).await {
                Ok(reservation) => {
                    let mut active: sales_order_item::ActiveModel = item.clone().into();
                    active.reservation_id = Set(Some(reservation.id));
                    active.update(&*self.db).await?;
                    ItemOutcome::Reserved {
                        reservation_id: reservation.id,
                    }
                }
                Err(e) if e.is_business_error() || e.is_retryable() => {
                    warn!(
                        order_id = %order.id,
                        item_id = %item.id,
                        error = %e,
                        "Failed to reserve order item"
                    );
                    ItemOutcome::Failed {
                        error: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            };

            results.push(ItemReservationResult {
                item_id: item.id,
                product_id: item.product_id,
                outcome,
            });
        }

        Ok(results)
    }

    /// Cancels every active/partial hold referencing a cancelled order.
    /// Missing or already-terminal reservations are skipped.
    async fn cancel_order_reservations(
        &self,
        order_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<ItemReservationResult>, ServiceError> {
        let holds = self
            .reservations
            .list_active_for_reference(ORDER_REFERENCE_TYPE, order_id)
            .await?;
        let items = self.list_items(order_id).await?;
        let mut results = Vec::with_capacity(holds.len());

        for hold in holds {
            let item_id = items
                .iter()
                .find(|item| item.reservation_id == Some(hold.id))
                .map(|item| item.id)
                .unwrap_or(hold.id);

            match self
                .reservations
                .cancel_reservation(hold.id, reason, ctx)
                .await
            {
                Ok(_) => results.push(ItemReservationResult {
                    item_id,
                    product_id: hold.product_id,
                    outcome: ItemOutcome::Cancelled {
                        reservation_id: hold.id,
                    },
                }),
                Err(ServiceError::AlreadyCancelled(_))
                | Err(ServiceError::AlreadyFulfilled(_))
                | Err(ServiceError::NotFound(_)) => {
                    warn!(
                        order_id = %order_id,
                        reservation_id = %hold.id,
                        "Reservation already terminal during order cancellation"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(results)
    }

    /// Fulfills part of an item by releasing its reservation and bumping
    /// the item's fulfilled counter.
    #[instrument(skip(self, idempotency_key, ctx))]
    pub async fn release_for_item(
        &self,
        item_id: Uuid,
        quantity: i32,
        idempotency_key: Option<String>,
        ctx: &RequestContext,
    ) -> Result<(sales_order_item::Model, reservation::Model), ServiceError> {
        let item = OrderItemEntity::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", item_id)))?;

        let reservation_id = item
            .reservation_id
            .ok_or(ServiceError::NoReservation(item_id))?;

        let reservation = self
            .reservations
            .release_reservation(
                reservation_id,
                quantity,
                Some(format!("fulfillment of order item {}", item_id)),
                idempotency_key,
                ctx,
            )
            .await?;

        let new_fulfilled = item.quantity_fulfilled + quantity;
        let mut active: sales_order_item::ActiveModel = item.into();
        active.quantity_fulfilled = Set(new_fulfilled);
        let item = active.update(&*self.db).await?;

        Ok((item, reservation))
    }

    async fn find_order(&self, order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    fn reservations_event_sender(&self) -> &crate::events::EventSender {
        self.reservations.event_sender()
    }
}
