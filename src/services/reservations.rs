//! Reservation ledger.
//!
//! Owns the full lifecycle of a reservation: create, partial/full release,
//! cancel, expire. Every state change writes the reservation row, the
//! per-location reserved counter and one append-only movement inside a single
//! transaction, so operational state and the audit log cannot diverge. The
//! read-validate-write path is serialized per (product, variant, location)
//! through a compare-and-swap on the level row's version column; a conflict
//! is retried once internally before surfacing.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::ReservationSettings;
use crate::entities::inventory_level::{self, Entity as InventoryLevelEntity};
use crate::entities::reservation::{self, Entity as ReservationEntity, ReservationStatus};
use crate::entities::reservation_movement::{
    self, Entity as MovementEntity, MovementType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::availability::{evaluate_availability, AvailabilityService};
use crate::services::RequestContext;

lazy_static! {
    static ref RESERVATIONS_CREATED: IntCounter = IntCounter::new(
        "stockhold_reservations_created_total",
        "Total number of reservations created"
    )
    .expect("metric can be created");
    static ref RESERVATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stockhold_reservation_failures_total",
            "Total number of failed reservation operations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref RESERVATION_CONFLICT_RETRIES: IntCounter = IntCounter::new(
        "stockhold_reservation_conflict_retries_total",
        "Internal retries after optimistic-concurrency conflicts"
    )
    .expect("metric can be created");
}

/// Request to place a hold on inventory.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub location_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 64))]
    pub reference_type: String,
    pub reference_id: Option<Uuid>,
    #[validate(length(max = 64))]
    pub reference_number: Option<String>,
    #[validate(length(max = 255))]
    pub reserved_for: Option<String>,
    pub priority: i32,
    pub auto_release: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Filters for listing reservations.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    /// Empty means any status.
    pub statuses: Vec<ReservationStatus>,
    pub organization_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    /// Free-text match over reservation number, reference number and the
    /// reserved-for note.
    pub search: Option<String>,
}

/// Service owning every reservation state change.
#[derive(Clone)]
pub struct ReservationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    settings: ReservationSettings,
}

impl ReservationService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            settings,
        }
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.event_sender
    }

    /// Checks availability for a requested quantity without mutating state.
    #[instrument(skip(self))]
    pub async fn validate_availability(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        location_id: Uuid,
        requested_quantity: i32,
    ) -> Result<crate::services::availability::AvailabilityValidation, ServiceError> {
        let level =
            AvailabilityService::find_level(&*self.db_pool, product_id, variant_id, location_id)
                .await?;
        let available = level.map(|l| l.available_quantity()).unwrap_or(0);
        Ok(evaluate_availability(
            available,
            requested_quantity,
            self.settings.low_stock_warning_factor,
        ))
    }

    /// Creates a reservation, holding `quantity` units against availability.
    ///
    /// Validation, the reserved-counter bump, the reservation row and the
    /// `RESERVE` movement are one transaction; two concurrent calls against
    /// the same tuple cannot both pass validation on the same availability.
    #[instrument(skip(self, request, ctx), fields(product_id = %request.product_id, location_id = %request.location_id, quantity = request.quantity))]
    pub async fn create_reservation(
        &self,
        request: CreateReservationRequest,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        request.validate().map_err(|e| {
            RESERVATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::ValidationError(format!("Invalid reservation request: {}", e))
        })?;

        let mut attempt = 0u32;
        loop {
            match self.try_create_reservation(&request, ctx).await {
                Err(ServiceError::ConcurrencyConflict(id))
                    if attempt < self.settings.conflict_retries =>
                {
                    attempt += 1;
                    RESERVATION_CONFLICT_RETRIES.inc();
                    warn!(
                        level_id = %id,
                        attempt = attempt,
                        "Reservation hit a concurrent update; retrying"
                    );
                }
                Err(e) => {
                    RESERVATION_FAILURES
                        .with_label_values(&[failure_label(&e)])
                        .inc();
                    return Err(e);
                }
                Ok((model, validation)) => {
                    RESERVATIONS_CREATED.inc();
                    info!(
                        reservation_id = %model.id,
                        reservation_number = %model.reservation_number,
                        quantity = model.reserved_quantity,
                        "Reservation created"
                    );
                    self.event_sender
                        .send_or_log(Event::ReservationCreated {
                            reservation_id: model.id,
                            reservation_number: model.reservation_number.clone(),
                            product_id: model.product_id,
                            location_id: model.location_id,
                            quantity: model.reserved_quantity,
                            reference_type: model.reference_type.clone(),
                            reference_id: model.reference_id,
                        })
                        .await;
                    if !validation.warnings.is_empty() {
                        self.event_sender
                            .send_or_log(Event::LowStockWarning {
                                product_id: model.product_id,
                                location_id: model.location_id,
                                available_quantity: validation.available_quantity
                                    - model.reserved_quantity,
                                requested_quantity: model.reserved_quantity,
                            })
                            .await;
                    }
                    return Ok(model);
                }
            }
        }
    }

    async fn try_create_reservation(
        &self,
        request: &CreateReservationRequest,
        ctx: &RequestContext,
    ) -> Result<(reservation::Model, crate::services::availability::AvailabilityValidation), ServiceError>
    {
        let txn = self.db_pool.begin().await?;

        let level = AvailabilityService::find_level(
            &txn,
            request.product_id,
            request.variant_id,
            request.location_id,
        )
        .await?
        .ok_or_else(|| {
            ServiceError::InsufficientStock(format!(
                "No inventory record for product {} at location {}",
                request.product_id, request.location_id
            ))
        })?;

        let validation = evaluate_availability(
            level.available_quantity(),
            request.quantity,
            self.settings.low_stock_warning_factor,
        );
        if !validation.is_valid {
            return Err(ServiceError::InsufficientStock(
                validation.errors.join("; "),
            ));
        }

        // Compare-and-swap on the level row: the availability check above is
        // only good for the version it was read at.
        let update = InventoryLevelEntity::update_many()
            .col_expr(
                inventory_level::Column::QuantityReserved,
                Expr::col(inventory_level::Column::QuantityReserved).add(request.quantity),
            )
            .col_expr(
                inventory_level::Column::Version,
                Expr::col(inventory_level::Column::Version).add(1),
            )
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::Id.eq(level.id))
            .filter(inventory_level::Column::Version.eq(level.version))
            .exec(&txn)
            .await?;
        if update.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(level.id));
        }

        let reservation_number = self.allocate_reservation_number(&txn).await?;

        let active = reservation::ActiveModel {
            reservation_number: Set(reservation_number),
            organization_id: Set(request.organization_id),
            branch_id: Set(request.branch_id),
            product_id: Set(request.product_id),
            variant_id: Set(request.variant_id),
            location_id: Set(request.location_id),
            reserved_quantity: Set(request.quantity),
            released_quantity: Set(0),
            status: Set(ReservationStatus::Active.as_str().to_string()),
            reference_type: Set(request.reference_type.clone()),
            reference_id: Set(request.reference_id),
            reference_number: Set(request.reference_number.clone()),
            reserved_for: Set(request.reserved_for.clone()),
            priority: Set(request.priority),
            auto_release: Set(request.auto_release),
            expires_at: Set(request.expires_at),
            created_by: Set(ctx.user_id),
            version: Set(1),
            ..Default::default()
        };

        let model = active.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                // Lost a race on the reservation number despite the
                // pre-check; the outer loop retries the whole unit.
                ServiceError::ConcurrencyConflict(level.id)
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        append_movement(
            &txn,
            &model,
            MovementType::Reserve,
            model.reserved_quantity,
            None,
            None,
            ctx,
        )
        .await?;

        txn.commit().await?;

        Ok((model, validation))
    }

    /// Generates a `RES-YYYYMMDD-NNNNN` number, retrying on collision.
    async fn allocate_reservation_number(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<String, ServiceError> {
        for _ in 0..self.settings.number_max_attempts {
            let candidate = generate_reservation_number(Utc::now());
            let taken = ReservationEntity::find()
                .filter(reservation::Column::ReservationNumber.eq(candidate.clone()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "Could not allocate a unique reservation number".to_string(),
        ))
    }

    /// Releases `quantity` units of an active or partial reservation.
    ///
    /// Releasing is not idempotent by quantity alone; callers retrying a
    /// network-failed release pass the same `idempotency_key` and the retry
    /// is recognized and short-circuited.
    #[instrument(skip(self, notes, idempotency_key, ctx))]
    pub async fn release_reservation(
        &self,
        reservation_id: Uuid,
        quantity: i32,
        notes: Option<String>,
        idempotency_key: Option<String>,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        let mut attempt = 0u32;
        loop {
            match self
                .try_release(reservation_id, quantity, &notes, &idempotency_key, ctx)
                .await
            {
                Err(ServiceError::ConcurrencyConflict(id))
                    if attempt < self.settings.conflict_retries =>
                {
                    attempt += 1;
                    RESERVATION_CONFLICT_RETRIES.inc();
                    warn!(reservation_id = %id, attempt = attempt, "Release conflicted; retrying");
                }
                Err(e) => {
                    RESERVATION_FAILURES
                        .with_label_values(&[failure_label(&e)])
                        .inc();
                    return Err(e);
                }
                Ok(model) => return Ok(model),
            }
        }
    }

    async fn try_release(
        &self,
        reservation_id: Uuid,
        quantity: i32,
        notes: &Option<String>,
        idempotency_key: &Option<String>,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let current = ReservationEntity::find_by_id(reservation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;

        match current.status_enum() {
            Some(ReservationStatus::Cancelled) | Some(ReservationStatus::Expired) => {
                return Err(ServiceError::AlreadyCancelled(reservation_id));
            }
            Some(ReservationStatus::Fulfilled) => {
                return Err(ServiceError::AlreadyFulfilled(reservation_id));
            }
            Some(_) => {}
            None => {
                return Err(ServiceError::InternalError(format!(
                    "Reservation {} has unknown status '{}'",
                    reservation_id, current.status
                )));
            }
        }

        if let Some(key) = idempotency_key {
            let replay = MovementEntity::find()
                .filter(reservation_movement::Column::ReservationId.eq(reservation_id))
                .filter(reservation_movement::Column::IdempotencyKey.eq(key.clone()))
                .one(&txn)
                .await?;
            if replay.is_some() {
                info!(
                    reservation_id = %reservation_id,
                    idempotency_key = %key,
                    "Release already applied; short-circuiting retry"
                );
                return Ok(current);
            }
        }

        let outstanding = current.outstanding_quantity();
        if quantity <= 0 || quantity > outstanding {
            return Err(ServiceError::OverRelease(format!(
                "Cannot release {} of reservation {}: {} outstanding",
                quantity, reservation_id, outstanding
            )));
        }

        let now = Utc::now();
        let new_released = current.released_quantity + quantity;
        let new_status = ReservationStatus::derive(new_released, current.reserved_quantity);
        let becomes_fulfilled = new_status == ReservationStatus::Fulfilled;

        let mut update = ReservationEntity::update_many()
            .col_expr(
                reservation::Column::ReleasedQuantity,
                Expr::value(new_released),
            )
            .col_expr(reservation::Column::Status, Expr::value(new_status.as_str()))
            .col_expr(reservation::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                reservation::Column::Version,
                Expr::col(reservation::Column::Version).add(1),
            );
        if becomes_fulfilled {
            update = update
                .col_expr(reservation::Column::FulfilledAt, Expr::value(now))
                .col_expr(reservation::Column::FulfilledBy, Expr::value(ctx.user_id));
        }
        let result = update
            .filter(reservation::Column::Id.eq(reservation_id))
            .filter(reservation::Column::Version.eq(current.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(reservation_id));
        }

        decrement_reserved(&txn, &current, quantity).await?;

        append_movement(
            &txn,
            &current,
            MovementType::Release,
            quantity,
            idempotency_key.clone(),
            notes.clone(),
            ctx,
        )
        .await
        .map_err(|e| match e {
            // Two concurrent retries with the same key: one wins the unique
            // index, the other retries and hits the replay short-circuit.
            ServiceError::DatabaseError(db)
                if is_unique_violation(&db) && idempotency_key.is_some() =>
            {
                ServiceError::ConcurrencyConflict(reservation_id)
            }
            other => other,
        })?;

        txn.commit().await?;

        info!(
            reservation_id = %reservation_id,
            quantity = quantity,
            new_status = new_status.as_str(),
            "Reservation released"
        );
        self.event_sender
            .send_or_log(Event::ReservationReleased {
                reservation_id,
                quantity,
                fully_released: becomes_fulfilled,
            })
            .await;

        let mut model = current;
        model.released_quantity = new_released;
        model.status = new_status.as_str().to_string();
        model.updated_at = Some(now);
        model.version += 1;
        if becomes_fulfilled {
            model.fulfilled_at = Some(now);
            model.fulfilled_by = ctx.user_id;
        }
        Ok(model)
    }

    /// Cancels a reservation, returning its unreleased remainder to the
    /// available pool.
    #[instrument(skip(self, reason, ctx))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        self.close_reservation(reservation_id, ReservationStatus::Cancelled, reason, ctx)
            .await
    }

    /// Shared terminal path for cancel and expire. Appends one `RELEASE`
    /// movement for the unreleased remainder so the log's release sum equals
    /// the reserved quantity for any reservation leaving the active pool.
    async fn close_reservation(
        &self,
        reservation_id: Uuid,
        terminal_status: ReservationStatus,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        debug_assert!(matches!(
            terminal_status,
            ReservationStatus::Cancelled | ReservationStatus::Expired
        ));

        let mut attempt = 0u32;
        loop {
            match self
                .try_close(reservation_id, terminal_status, reason, ctx)
                .await
            {
                Err(ServiceError::ConcurrencyConflict(id))
                    if attempt < self.settings.conflict_retries =>
                {
                    attempt += 1;
                    RESERVATION_CONFLICT_RETRIES.inc();
                    warn!(reservation_id = %id, attempt = attempt, "Close conflicted; retrying");
                }
                Err(e) => {
                    RESERVATION_FAILURES
                        .with_label_values(&[failure_label(&e)])
                        .inc();
                    return Err(e);
                }
                Ok(model) => return Ok(model),
            }
        }
    }

    async fn try_close(
        &self,
        reservation_id: Uuid,
        terminal_status: ReservationStatus,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<reservation::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let current = ReservationEntity::find_by_id(reservation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;

        match current.status_enum() {
            Some(ReservationStatus::Cancelled) | Some(ReservationStatus::Expired) => {
                return Err(ServiceError::AlreadyCancelled(reservation_id));
            }
            Some(ReservationStatus::Fulfilled) => {
                return Err(ServiceError::AlreadyFulfilled(reservation_id));
            }
            Some(_) => {}
            None => {
                return Err(ServiceError::InternalError(format!(
                    "Reservation {} has unknown status '{}'",
                    reservation_id, current.status
                )));
            }
        }

        let now = Utc::now();
        let remaining = current.outstanding_quantity();

        let result = ReservationEntity::update_many()
            .col_expr(
                reservation::Column::Status,
                Expr::value(terminal_status.as_str()),
            )
            .col_expr(reservation::Column::CancelledAt, Expr::value(now))
            .col_expr(reservation::Column::CancelledBy, Expr::value(ctx.user_id))
            .col_expr(
                reservation::Column::CancellationReason,
                Expr::value(reason),
            )
            .col_expr(reservation::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                reservation::Column::Version,
                Expr::col(reservation::Column::Version).add(1),
            )
            .filter(reservation::Column::Id.eq(reservation_id))
            .filter(reservation::Column::Version.eq(current.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(reservation_id));
        }

        if remaining > 0 {
            decrement_reserved(&txn, &current, remaining).await?;
            append_movement(
                &txn,
                &current,
                MovementType::Release,
                remaining,
                None,
                Some(reason.to_string()),
                ctx,
            )
            .await?;
        }

        txn.commit().await?;

        info!(
            reservation_id = %reservation_id,
            status = terminal_status.as_str(),
            returned_quantity = remaining,
            reason = reason,
            "Reservation closed"
        );
        let event = match terminal_status {
            ReservationStatus::Expired => Event::ReservationExpired {
                reservation_id,
                unreleased_quantity: remaining,
                expired_at: now,
            },
            _ => Event::ReservationCancelled {
                reservation_id,
                unreleased_quantity: remaining,
                reason: reason.to_string(),
            },
        };
        self.event_sender.send_or_log(event).await;

        let mut model = current;
        model.status = terminal_status.as_str().to_string();
        model.cancelled_at = Some(now);
        model.cancelled_by = ctx.user_id;
        model.cancellation_reason = Some(reason.to_string());
        model.updated_at = Some(now);
        model.version += 1;
        Ok(model)
    }

    /// Expires every past-due, auto-release hold in the organization.
    ///
    /// Runs the same terminal path as an interactive cancel, with reason
    /// `"expired"`. Rows that race interactive operations are skipped.
    #[instrument(skip(self))]
    pub async fn sweep_expired(
        &self,
        organization_id: Uuid,
        branch_id: Option<Uuid>,
    ) -> Result<Vec<reservation::Model>, ServiceError> {
        let now = Utc::now();

        let mut query = ReservationEntity::find()
            .filter(reservation::Column::OrganizationId.eq(organization_id))
            .filter(reservation::Column::Status.is_in([
                ReservationStatus::Active.as_str(),
                ReservationStatus::Partial.as_str(),
            ]))
            .filter(reservation::Column::AutoRelease.eq(true))
            .filter(reservation::Column::ExpiresAt.lt(now));
        if let Some(branch) = branch_id {
            query = query.filter(reservation::Column::BranchId.eq(branch));
        }

        let candidates = query.all(&*self.db_pool).await?;
        let mut expired = Vec::new();

        for candidate in candidates {
            let ctx = RequestContext::system();
            match self
                .close_reservation(candidate.id, ReservationStatus::Expired, "expired", &ctx)
                .await
            {
                Ok(model) => expired.push(model),
                Err(e) if e.is_retryable() || e.is_business_error() => {
                    // Lost a race against an interactive release/cancel.
                    warn!(
                        reservation_id = %candidate.id,
                        error = %e,
                        "Skipping reservation during expiry sweep"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            organization_id = %organization_id,
            expired_count = expired.len(),
            "Completed expiry sweep"
        );
        Ok(expired)
    }

    /// Gets a reservation by ID.
    #[instrument(skip(self))]
    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<reservation::Model>, ServiceError> {
        ReservationEntity::find_by_id(reservation_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Lists reservations with pagination and filters.
    #[instrument(skip(self, filter))]
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<reservation::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        let mut query = ReservationEntity::find();

        if !filter.statuses.is_empty() {
            query = query.filter(
                reservation::Column::Status
                    .is_in(filter.statuses.iter().map(|s| s.as_str())),
            );
        }
        if let Some(organization_id) = filter.organization_id {
            query = query.filter(reservation::Column::OrganizationId.eq(organization_id));
        }
        if let Some(reference_type) = &filter.reference_type {
            query = query.filter(reservation::Column::ReferenceType.eq(reference_type.clone()));
        }
        if let Some(reference_id) = filter.reference_id {
            query = query.filter(reservation::Column::ReferenceId.eq(reference_id));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(reservation::Column::ProductId.eq(product_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(reservation::Column::LocationId.eq(location_id));
        }
        if let Some(search) = &filter.search {
            query = query.filter(
                Condition::any()
                    .add(reservation::Column::ReservationNumber.contains(search.as_str()))
                    .add(reservation::Column::ReferenceNumber.contains(search.as_str()))
                    .add(reservation::Column::ReservedFor.contains(search.as_str())),
            );
        }

        query = query
            .order_by_desc(reservation::Column::Priority)
            .order_by_desc(reservation::Column::CreatedAt);

        let paginator = query.paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            ServiceError::InternalError(format!("Failed to count reservations: {}", e))
        })?;
        let models = paginator.fetch_page(page - 1).await.map_err(|e| {
            ServiceError::InternalError(format!("Failed to fetch reservations page: {}", e))
        })?;

        Ok((models, total))
    }

    /// Lists the active/partial reservations backing a reference (e.g. all
    /// holds created by one sales order).
    #[instrument(skip(self))]
    pub async fn list_active_for_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<Vec<reservation::Model>, ServiceError> {
        ReservationEntity::find()
            .filter(reservation::Column::ReferenceType.eq(reference_type))
            .filter(reservation::Column::ReferenceId.eq(reference_id))
            .filter(reservation::Column::Status.is_in([
                ReservationStatus::Active.as_str(),
                ReservationStatus::Partial.as_str(),
            ]))
            .order_by_desc(reservation::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Movement log for one reservation, oldest first.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        reservation_id: Uuid,
    ) -> Result<Vec<reservation_movement::Model>, ServiceError> {
        MovementEntity::find()
            .filter(reservation_movement::Column::ReservationId.eq(reservation_id))
            .order_by_asc(reservation_movement::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Upserts the on-hand quantity for a tuple, preserving the reserved
    /// counter. The physical stock store owns on-hand; this is its write
    /// interface into the engine's level row (and the seed path for tests).
    #[instrument(skip(self))]
    pub async fn set_on_hand(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        location_id: Uuid,
        quantity_on_hand: i32,
    ) -> Result<inventory_level::Model, ServiceError> {
        let existing =
            AvailabilityService::find_level(&*self.db_pool, product_id, variant_id, location_id)
                .await?;

        match existing {
            Some(level) => {
                // Bumping the version makes any in-flight create lose its
                // CAS and re-validate against the new on-hand quantity.
                let next_version = level.version + 1;
                let mut active: inventory_level::ActiveModel = level.into();
                active.quantity_on_hand = Set(quantity_on_hand);
                active.version = Set(next_version);
                active.update(&*self.db_pool).await.map_err(Into::into)
            }
            None => {
                let active = inventory_level::ActiveModel {
                    product_id: Set(product_id),
                    variant_id: Set(variant_id),
                    location_id: Set(location_id),
                    quantity_on_hand: Set(quantity_on_hand),
                    quantity_reserved: Set(0),
                    version: Set(1),
                    ..Default::default()
                };
                active.insert(&*self.db_pool).await.map_err(Into::into)
            }
        }
    }
}

/// Atomically returns `quantity` units from a reservation to the available
/// pool. A blind decrement is safe here; only the read-validate-write create
/// path needs the version guard.
async fn decrement_reserved<C: ConnectionTrait>(
    db: &C,
    reservation: &reservation::Model,
    quantity: i32,
) -> Result<(), ServiceError> {
    let mut update = InventoryLevelEntity::update_many()
        .col_expr(
            inventory_level::Column::QuantityReserved,
            Expr::col(inventory_level::Column::QuantityReserved).sub(quantity),
        )
        .col_expr(
            inventory_level::Column::Version,
            Expr::col(inventory_level::Column::Version).add(1),
        )
        .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_level::Column::ProductId.eq(reservation.product_id))
        .filter(inventory_level::Column::LocationId.eq(reservation.location_id));
    update = match reservation.variant_id {
        Some(variant) => update.filter(inventory_level::Column::VariantId.eq(variant)),
        None => update.filter(inventory_level::Column::VariantId.is_null()),
    };

    let result = update.exec(db).await?;
    if result.rows_affected == 0 {
        warn!(
            reservation_id = %reservation.id,
            product_id = %reservation.product_id,
            "No inventory level row to decrement; reserved counter may drift"
        );
    }
    Ok(())
}

async fn append_movement<C: ConnectionTrait>(
    db: &C,
    reservation: &reservation::Model,
    movement_type: MovementType,
    quantity: i32,
    idempotency_key: Option<String>,
    notes: Option<String>,
    ctx: &RequestContext,
) -> Result<reservation_movement::Model, ServiceError> {
    let active = reservation_movement::ActiveModel {
        reservation_id: Set(reservation.id),
        movement_type: Set(movement_type.as_str().to_string()),
        product_id: Set(reservation.product_id),
        variant_id: Set(reservation.variant_id),
        location_id: Set(reservation.location_id),
        quantity: Set(quantity),
        idempotency_key: Set(idempotency_key),
        notes: Set(notes),
        created_by: Set(ctx.user_id),
        ..Default::default()
    };
    active.insert(db).await.map_err(Into::into)
}

fn generate_reservation_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("RES-{}-{:05}", now.format("%Y%m%d"), suffix)
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

fn failure_label(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::OverRelease(_) => "over_release",
        ServiceError::AlreadyCancelled(_) => "already_cancelled",
        ServiceError::AlreadyFulfilled(_) => "already_fulfilled",
        ServiceError::ConcurrencyConflict(_) => "concurrency_conflict",
        ServiceError::ValidationError(_) => "validation_error",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::DatabaseError(_) => "database_error",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_number_format() {
        let now = Utc::now();
        let number = generate_reservation_number(now);
        let date = now.format("%Y%m%d").to_string();
        assert!(number.starts_with(&format!("RES-{}-", date)));
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn failure_labels_cover_business_errors() {
        assert_eq!(
            failure_label(&ServiceError::InsufficientStock("x".into())),
            "insufficient_stock"
        );
        assert_eq!(
            failure_label(&ServiceError::ConcurrencyConflict(Uuid::new_v4())),
            "concurrency_conflict"
        );
        assert_eq!(
            failure_label(&ServiceError::EventError("x".into())),
            "other"
        );
    }
}
