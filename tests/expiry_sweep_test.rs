mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use stockhold_api::entities::reservation::ReservationStatus;
use stockhold_api::entities::reservation_movement::MovementType;

#[tokio::test]
async fn sweep_expires_past_due_auto_release_holds_and_returns_stock() {
    let state = common::setup().await;
    let organization_id = Uuid::new_v4();
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let mut request = common::reservation_request(product, location, 4);
    request.organization_id = organization_id;
    request.auto_release = true;
    request.expires_at = Some(Utc::now() - Duration::minutes(5));
    let past_due = state
        .reservation_service
        .create_reservation(request, &ctx)
        .await
        .expect("past-due hold");

    let mut request = common::reservation_request(product, location, 3);
    request.organization_id = organization_id;
    request.auto_release = true;
    request.expires_at = Some(Utc::now() + Duration::hours(1));
    let future = state
        .reservation_service
        .create_reservation(request, &ctx)
        .await
        .expect("future hold");

    let expired = state
        .reservation_service
        .sweep_expired(organization_id, None)
        .await
        .expect("sweep");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, past_due.id);
    assert_eq!(expired[0].status, ReservationStatus::Expired.as_str());
    // Expiry does not rewrite fulfillment history.
    assert_eq!(expired[0].released_quantity, 0);

    // The remainder went back to the pool; the future hold still holds its 3.
    let level = state
        .availability_service
        .get_available(product, None, location)
        .await
        .unwrap();
    assert_eq!(level.quantity_reserved, 3);
    assert_eq!(level.available_quantity, 7);

    let untouched = state
        .reservation_service
        .get_reservation(future.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.status, ReservationStatus::Active.as_str());

    // The movement log closes the book: RESERVE 4 then RELEASE 4.
    let movements = state
        .reservation_service
        .list_movements(past_due.id)
        .await
        .unwrap();
    let released: i32 = movements
        .iter()
        .filter(|m| m.movement_type == MovementType::Release.as_str())
        .map(|m| m.quantity)
        .sum();
    assert_eq!(released, past_due.reserved_quantity);
}

#[tokio::test]
async fn sweep_ignores_holds_without_auto_release() {
    let state = common::setup().await;
    let organization_id = Uuid::new_v4();
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    // Past due, but the caller opted out of automatic release.
    let mut request = common::reservation_request(product, location, 4);
    request.organization_id = organization_id;
    request.auto_release = false;
    request.expires_at = Some(Utc::now() - Duration::minutes(5));
    let hold = state
        .reservation_service
        .create_reservation(request, &ctx)
        .await
        .expect("manual hold");

    let expired = state
        .reservation_service
        .sweep_expired(organization_id, None)
        .await
        .expect("sweep");
    assert!(expired.is_empty());

    let unchanged = state
        .reservation_service
        .get_reservation(hold.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, ReservationStatus::Active.as_str());
    let level = state
        .availability_service
        .get_available(product, None, location)
        .await
        .unwrap();
    assert_eq!(level.quantity_reserved, 4);
}

#[tokio::test]
async fn sweep_expires_partially_released_holds_for_the_remainder() {
    let state = common::setup().await;
    let organization_id = Uuid::new_v4();
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let mut request = common::reservation_request(product, location, 6);
    request.organization_id = organization_id;
    request.auto_release = true;
    request.expires_at = Some(Utc::now() - Duration::minutes(1));
    let hold = state
        .reservation_service
        .create_reservation(request, &ctx)
        .await
        .expect("create");
    state
        .reservation_service
        .release_reservation(hold.id, 2, None, None, &ctx)
        .await
        .expect("partial release");

    let expired = state
        .reservation_service
        .sweep_expired(organization_id, None)
        .await
        .expect("sweep");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].released_quantity, 2);

    let level = state
        .availability_service
        .get_available(product, None, location)
        .await
        .unwrap();
    assert_eq!(level.quantity_reserved, 0);

    // Conservation across the log: RELEASE movements sum to the full hold.
    let movements = state
        .reservation_service
        .list_movements(hold.id)
        .await
        .unwrap();
    let released: i32 = movements
        .iter()
        .filter(|m| m.movement_type == MovementType::Release.as_str())
        .map(|m| m.quantity)
        .sum();
    assert_eq!(released, 6);
}
