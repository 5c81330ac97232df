mod common;

use assert_matches::assert_matches;
use rstest::rstest;
use uuid::Uuid;

use stockhold_api::entities::reservation::ReservationStatus;
use stockhold_api::entities::sales_order::OrderStatus;
use stockhold_api::errors::ServiceError;
use stockhold_api::services::orders::{CreateOrderItem, CreateOrderRequest, ItemOutcome};

fn order_request(items: Vec<CreateOrderItem>) -> CreateOrderRequest {
    CreateOrderRequest {
        organization_id: Uuid::new_v4(),
        branch_id: Uuid::new_v4(),
        order_number: format!("SO-{}", Uuid::new_v4().simple()),
        items,
    }
}

fn item(product_id: Uuid, location_id: Option<Uuid>, quantity: i32) -> CreateOrderItem {
    CreateOrderItem {
        product_id,
        variant_id: None,
        location_id,
        quantity,
    }
}

#[tokio::test]
async fn happy_path_walks_the_full_state_machine() {
    let state = common::setup().await;
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(order_request(vec![item(product, Some(location), 4)]), &ctx)
        .await
        .expect("create order");
    assert_eq!(
        state.order_status_service.get_status(order.id).await.unwrap(),
        OrderStatus::Draft
    );

    for target in [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Fulfilled,
    ] {
        let transition = state
            .order_status_service
            .transition_status(order.id, target, None, &ctx)
            .await
            .expect("transition");
        assert_eq!(transition.order.status, target.as_str());
    }
}

#[rstest]
#[case(OrderStatus::Draft, OrderStatus::Confirmed)]
#[case(OrderStatus::Draft, OrderStatus::Processing)]
#[case(OrderStatus::Draft, OrderStatus::Fulfilled)]
#[case(OrderStatus::Pending, OrderStatus::Processing)]
#[case(OrderStatus::Pending, OrderStatus::Fulfilled)]
#[case(OrderStatus::Pending, OrderStatus::Draft)]
#[case(OrderStatus::Confirmed, OrderStatus::Fulfilled)]
#[case(OrderStatus::Confirmed, OrderStatus::Pending)]
#[case(OrderStatus::Processing, OrderStatus::Confirmed)]
#[tokio::test]
async fn disallowed_edges_fail_and_leave_the_order_unchanged(
    #[case] from: OrderStatus,
    #[case] to: OrderStatus,
) {
    let state = common::setup().await;
    let ctx = common::user_ctx();
    let (order, _) = state
        .order_status_service
        .create_order(
            order_request(vec![item(Uuid::new_v4(), None, 1)]),
            &ctx,
        )
        .await
        .expect("create order");

    // Walk the order to the starting status along legal edges.
    let path: &[OrderStatus] = match from {
        OrderStatus::Draft => &[],
        OrderStatus::Pending => &[OrderStatus::Pending],
        OrderStatus::Confirmed => &[OrderStatus::Pending, OrderStatus::Confirmed],
        OrderStatus::Processing => &[
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
        ],
        _ => unreachable!("cases start from non-terminal statuses"),
    };
    for step in path {
        state
            .order_status_service
            .transition_status(order.id, *step, None, &ctx)
            .await
            .expect("legal step");
    }

    let result = state
        .order_status_service
        .transition_status(order.id, to, None, &ctx)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTransition { .. }));
    assert_eq!(
        state.order_status_service.get_status(order.id).await.unwrap(),
        from
    );
}

#[rstest]
#[case(OrderStatus::Fulfilled)]
#[case(OrderStatus::Cancelled)]
#[tokio::test]
async fn terminal_orders_accept_no_transition(#[case] terminal: OrderStatus) {
    let state = common::setup().await;
    let ctx = common::user_ctx();
    let (order, _) = state
        .order_status_service
        .create_order(order_request(vec![item(Uuid::new_v4(), None, 1)]), &ctx)
        .await
        .expect("create order");

    let path: &[OrderStatus] = match terminal {
        OrderStatus::Fulfilled => &[
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Fulfilled,
        ],
        _ => &[OrderStatus::Cancelled],
    };
    for step in path {
        state
            .order_status_service
            .transition_status(order.id, *step, None, &ctx)
            .await
            .expect("legal step");
    }

    for target in [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Fulfilled,
        OrderStatus::Cancelled,
    ] {
        let result = state
            .order_status_service
            .transition_status(order.id, target, None, &ctx)
            .await;
        assert_matches!(result, Err(ServiceError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn racing_identical_transitions_resolve_without_conflict_errors() {
    let state = common::setup().await;
    let ctx = common::user_ctx();
    let (order, _) = state
        .order_status_service
        .create_order(order_request(vec![item(Uuid::new_v4(), None, 1)]), &ctx)
        .await
        .expect("create order");

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = state.order_status_service.clone();
        let ctx = common::user_ctx();
        let id = order.id;
        handles.push(tokio::spawn(async move {
            service
                .transition_status(id, OrderStatus::Pending, None, &ctx)
                .await
        }));
    }

    // The loser of the version race retries internally, re-reads the fresh
    // status and reports a state-machine violation, never a raw conflict.
    let mut succeeded = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => succeeded += 1,
            Err(ServiceError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(
        state.order_status_service.get_status(order.id).await.unwrap(),
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn confirmation_reserves_eligible_items_and_reports_skips() {
    let state = common::setup().await;
    let (product_a, product_b) = (Uuid::new_v4(), Uuid::new_v4());
    let location = Uuid::new_v4();
    state
        .reservation_service
        .set_on_hand(product_a, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(
            order_request(vec![
                item(product_a, Some(location), 4),
                // Second item has no location and must be skipped, not failed.
                item(product_b, None, 2),
            ]),
            &ctx,
        )
        .await
        .expect("create order");

    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Pending, None, &ctx)
        .await
        .expect("to pending");
    let transition = state
        .order_status_service
        .transition_status(order.id, OrderStatus::Confirmed, None, &ctx)
        .await
        .expect("confirmation succeeds despite the skip");

    assert_eq!(transition.order.status, OrderStatus::Confirmed.as_str());
    assert_eq!(transition.item_results.len(), 2);

    let reserved: Vec<_> = transition
        .item_results
        .iter()
        .filter(|r| matches!(r.outcome, ItemOutcome::Reserved { .. }))
        .collect();
    let skipped: Vec<_> = transition
        .item_results
        .iter()
        .filter(|r| matches!(r.outcome, ItemOutcome::Skipped { .. }))
        .collect();
    assert_eq!(reserved.len(), 1);
    assert_eq!(skipped.len(), 1);
    assert_eq!(reserved[0].product_id, product_a);
    assert_eq!(skipped[0].product_id, product_b);

    // The reservation id landed on the item row.
    let items = state
        .order_status_service
        .list_items(order.id)
        .await
        .expect("items");
    let with_hold: Vec<_> = items.iter().filter(|i| i.reservation_id.is_some()).collect();
    assert_eq!(with_hold.len(), 1);
    assert_eq!(with_hold[0].product_id, product_a);

    // Hold has order-reservation policy: priority 1, no auto-release.
    let hold = state
        .reservation_service
        .get_reservation(with_hold[0].reservation_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hold.priority, 1);
    assert!(!hold.auto_release);
    assert_eq!(hold.reference_type, "sales_order");
    assert_eq!(hold.reference_id, Some(order.id));
}

#[tokio::test]
async fn insufficient_stock_on_one_item_does_not_block_the_others() {
    let state = common::setup().await;
    let (product_a, product_b) = (Uuid::new_v4(), Uuid::new_v4());
    let location = Uuid::new_v4();
    state
        .reservation_service
        .set_on_hand(product_a, None, location, 10)
        .await
        .expect("seed a");
    state
        .reservation_service
        .set_on_hand(product_b, None, location, 1)
        .await
        .expect("seed b");
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(
            order_request(vec![
                item(product_a, Some(location), 4),
                item(product_b, Some(location), 5),
            ]),
            &ctx,
        )
        .await
        .expect("create order");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Pending, None, &ctx)
        .await
        .expect("to pending");

    let transition = state
        .order_status_service
        .transition_status(order.id, OrderStatus::Confirmed, None, &ctx)
        .await
        .expect("transition still succeeds");

    let mut reserved = 0;
    let mut failed = 0;
    for result in &transition.item_results {
        match &result.outcome {
            ItemOutcome::Reserved { .. } => reserved += 1,
            ItemOutcome::Failed { error } => {
                failed += 1;
                assert!(error.contains("Insufficient stock"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(reserved, 1);
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn cancelling_an_order_revokes_its_holds() {
    let state = common::setup().await;
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(order_request(vec![item(product, Some(location), 6)]), &ctx)
        .await
        .expect("create order");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Pending, None, &ctx)
        .await
        .expect("to pending");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Confirmed, None, &ctx)
        .await
        .expect("to confirmed");

    assert_eq!(
        state
            .availability_service
            .get_available(product, None, location)
            .await
            .unwrap()
            .available_quantity,
        4
    );

    let transition = state
        .order_status_service
        .transition_status(order.id, OrderStatus::Cancelled, None, &ctx)
        .await
        .expect("cancel order");
    assert_eq!(transition.order.status, OrderStatus::Cancelled.as_str());
    assert_eq!(transition.item_results.len(), 1);
    assert_matches!(
        transition.item_results[0].outcome,
        ItemOutcome::Cancelled { .. }
    );

    // The hold was released back to the pool with the default reason.
    let items = state.order_status_service.list_items(order.id).await.unwrap();
    let hold = state
        .reservation_service
        .get_reservation(items[0].reservation_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hold.status, ReservationStatus::Cancelled.as_str());
    assert_eq!(hold.cancellation_reason.as_deref(), Some("order cancelled"));
    assert_eq!(
        state
            .availability_service
            .get_available(product, None, location)
            .await
            .unwrap()
            .available_quantity,
        10
    );
}

#[tokio::test]
async fn item_fulfillment_releases_through_the_ledger() {
    let state = common::setup().await;
    let (product, location) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .reservation_service
        .set_on_hand(product, None, location, 10)
        .await
        .expect("seed");
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(order_request(vec![item(product, Some(location), 6)]), &ctx)
        .await
        .expect("create order");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Pending, None, &ctx)
        .await
        .expect("to pending");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Confirmed, None, &ctx)
        .await
        .expect("to confirmed");

    let items = state.order_status_service.list_items(order.id).await.unwrap();
    let (updated_item, reservation) = state
        .order_status_service
        .release_for_item(items[0].id, 4, None, &ctx)
        .await
        .expect("fulfill 4");

    assert_eq!(updated_item.quantity_fulfilled, 4);
    assert_eq!(reservation.released_quantity, 4);
    assert_eq!(reservation.status, ReservationStatus::Partial.as_str());
}

#[tokio::test]
async fn fulfilling_a_skipped_item_fails_with_no_reservation() {
    let state = common::setup().await;
    let ctx = common::user_ctx();

    let (order, _) = state
        .order_status_service
        .create_order(
            order_request(vec![item(Uuid::new_v4(), None, 2)]),
            &ctx,
        )
        .await
        .expect("create order");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Pending, None, &ctx)
        .await
        .expect("to pending");
    state
        .order_status_service
        .transition_status(order.id, OrderStatus::Confirmed, None, &ctx)
        .await
        .expect("to confirmed");

    let items = state.order_status_service.list_items(order.id).await.unwrap();
    let result = state
        .order_status_service
        .release_for_item(items[0].id, 1, None, &ctx)
        .await;
    assert_matches!(result, Err(ServiceError::NoReservation(_)));
}
