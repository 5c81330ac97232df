use proptest::prelude::*;

use stockhold_api::entities::reservation::ReservationStatus;
use stockhold_api::entities::sales_order::OrderStatus;
use stockhold_api::services::orders::allowed_transitions;

proptest! {
    /// Status derivation over any (released, reserved) pair with
    /// 0 <= released <= reserved.
    #[test]
    fn derived_status_tracks_release_progress(reserved in 1i32..=10_000, frac in 0.0f64..=1.0) {
        let released = ((reserved as f64) * frac) as i32;
        let status = ReservationStatus::derive(released, reserved);
        if released == 0 {
            prop_assert_eq!(status, ReservationStatus::Active);
        } else if released < reserved {
            prop_assert_eq!(status, ReservationStatus::Partial);
        } else {
            prop_assert_eq!(status, ReservationStatus::Fulfilled);
        }
        // Only the terminal overrides stop holding stock before full release.
        prop_assert_eq!(status.holds_stock(), released < reserved);
    }

    /// Status strings survive the round trip through storage.
    #[test]
    fn status_strings_round_trip(idx in 0usize..5) {
        let statuses = [
            ReservationStatus::Active,
            ReservationStatus::Partial,
            ReservationStatus::Fulfilled,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ];
        let status = statuses[idx];
        prop_assert_eq!(ReservationStatus::from_str(status.as_str()), Some(status));
    }
}

#[test]
fn every_transition_path_reaches_a_terminal_status() {
    // From any status, following allowed edges always terminates: the state
    // machine has no cycles and no self-transitions.
    let all = [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Fulfilled,
        OrderStatus::Cancelled,
    ];
    for start in all {
        let mut frontier = vec![(start, 0usize)];
        while let Some((status, depth)) = frontier.pop() {
            assert!(depth <= all.len(), "cycle reachable from {:?}", start);
            for next in allowed_transitions(status) {
                assert_ne!(*next, status, "self-transition on {:?}", status);
                frontier.push((*next, depth + 1));
            }
        }
    }
    for terminal in [OrderStatus::Fulfilled, OrderStatus::Cancelled] {
        assert!(allowed_transitions(terminal).is_empty());
        assert!(terminal.is_terminal());
    }
}
