use std::sync::Arc;
use uuid::Uuid;

use stockhold_api::config::AppConfig;
use stockhold_api::services::reservations::CreateReservationRequest;
use stockhold_api::services::RequestContext;
use stockhold_api::{db, events, AppState};

/// Spins up a fresh in-memory database with migrations applied and a
/// logging event consumer, returning the wired application state.
pub async fn setup() -> AppState {
    let config = AppConfig::for_tests();
    let pool = db::establish_connection_from_app_config(&config)
        .await
        .expect("db connect");

    let (sender, rx) = events::channel(100);
    tokio::spawn(events::process_events(rx));

    AppState::new(Arc::new(pool), config, sender)
}

pub fn user_ctx() -> RequestContext {
    RequestContext::for_user(Uuid::new_v4())
}

/// A create request with sensible defaults for one product/location tuple.
pub fn reservation_request(
    product_id: Uuid,
    location_id: Uuid,
    quantity: i32,
) -> CreateReservationRequest {
    CreateReservationRequest {
        organization_id: Uuid::new_v4(),
        branch_id: Uuid::new_v4(),
        product_id,
        variant_id: None,
        location_id,
        quantity,
        reference_type: "allocation".to_string(),
        reference_id: None,
        reference_number: None,
        reserved_for: Some("integration test".to_string()),
        priority: 0,
        auto_release: false,
        expires_at: None,
    }
}
