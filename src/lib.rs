//! Stockhold API Library
//!
//! This crate provides the stock reservation and allocation engine: logical
//! holds on inventory, partial fulfillment tracking, a sales order status
//! state machine that issues and revokes those holds, and an append-only
//! movement log kept in sync with operational state.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared application state wiring the engine's services together.
///
/// Embedding applications construct this once and hand out clones; every
/// service is cheap to clone (Arc-backed connection pool plus an event
/// sender handle).
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub availability_service: services::availability::AvailabilityService,
    pub reservation_service: services::reservations::ReservationService,
    pub order_status_service: services::orders::OrderStatusService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let availability_service = services::availability::AvailabilityService::new(
            db.clone(),
            config.reservations.clone(),
        );
        let reservation_service = services::reservations::ReservationService::new(
            db.clone(),
            event_sender.clone(),
            config.reservations.clone(),
        );
        let order_status_service = services::orders::OrderStatusService::new(
            db.clone(),
            reservation_service.clone(),
            config.reservations.clone(),
        );
        Self {
            db,
            config,
            event_sender,
            availability_service,
            reservation_service,
            order_status_service,
        }
    }
}
