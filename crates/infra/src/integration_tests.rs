//! Integration tests for the fulfillment pipeline.
//!
//! Service call → Dispatcher → EventStore → Projections → queries
//!
//! Verifies:
//! - Releases, deliveries and ledger movements keep their counters in step
//! - Multi-stream operations are all-or-nothing
//! - Concurrent writers never oversubscribe a line or overdraw an item

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;
use proptest::prelude::*;

use stockline_auth::{Actor, Role};
use stockline_core::Aggregate;
use stockline_inventory::{ItemId, MovementDirection, ReferenceType, StockPolicy, replay_balance};
use stockline_orders::{BlanketOrder, BlanketOrderStatus, OrderLineId, Release, ReleaseId, ReleaseStatus};

use crate::config::DispatchConfig;
use crate::event_store::EventStore;
use crate::fulfillment::{
    AdjustStock, DeductStock, FulfillmentError, InMemoryFulfillmentService, NewLine, OrderHeader,
    OrderSnapshot,
};

fn service() -> InMemoryFulfillmentService {
    InMemoryFulfillmentService::in_memory(&DispatchConfig::default())
}

/// Generous retry budget so thread races end in business outcomes.
fn contended_service() -> Arc<InMemoryFulfillmentService> {
    Arc::new(InMemoryFulfillmentService::in_memory(&DispatchConfig {
        max_conflict_retries: 64,
    }))
}

fn operator() -> Actor {
    Actor::with_role(Role::Operator)
}

fn supervisor() -> Actor {
    Actor::with_role(Role::Supervisor)
}

fn manager() -> Actor {
    Actor::with_role(Role::Manager)
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

fn header(order_number: &str) -> OrderHeader {
    OrderHeader {
        order_number: order_number.to_string(),
        customer_name: "Acme Manufacturing".to_string(),
        order_date: date(1, 5),
        start_date: date(1, 10),
        end_date: date(12, 31),
    }
}

fn stocked_item(svc: &InMemoryFulfillmentService, opening: i64) -> ItemId {
    let item_id = ItemId::generate();
    svc.register_item(&supervisor(), item_id, "Hex bolt M8", StockPolicy::default())
        .unwrap();
    if opening > 0 {
        svc.adjust(
            &supervisor(),
            AdjustStock {
                item_id,
                direction: MovementDirection::In,
                quantity: opening,
                reason: "opening balance".to_string(),
                reference_type: ReferenceType::Production,
                reference_id: "PRD-1".to_string(),
            },
        )
        .unwrap();
    }
    item_id
}

fn order_with_line(
    svc: &InMemoryFulfillmentService,
    order_number: &str,
    item_id: ItemId,
    total_quantity: i64,
) -> (OrderSnapshot, OrderLineId) {
    let order = svc
        .create_order(&supervisor(), header(order_number), vec![NewLine { item_id, total_quantity }])
        .unwrap();
    let line_id = order.lines[0].line_id;
    (order, line_id)
}

fn ship_and_deliver(svc: &InMemoryFulfillmentService, release_id: ReleaseId) -> Result<(), FulfillmentError> {
    svc.update_release_status(&operator(), release_id, ReleaseStatus::Shipped)?;
    svc.update_release_status(&operator(), release_id, ReleaseStatus::Delivered)?;
    Ok(())
}

#[test]
fn new_order_starts_with_untouched_lines() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);

    let (order, line_id) = order_with_line(&svc, "BO-100", item_id, 100);
    assert_eq!(order.status, BlanketOrderStatus::Active);
    assert_eq!(order.lines.len(), 1);

    let line = svc.get_line(line_id).unwrap();
    assert_eq!(line.line_no, 1);
    assert_eq!(line.released_quantity, 0);
    assert_eq!(line.delivered_quantity, 0);
    assert_eq!(line.remaining_quantity, 100);

    assert_eq!(svc.get_order(order.order_id).unwrap(), order);
    assert_eq!(svc.list_available_lines(), vec![line]);
}

#[test]
fn release_reserves_remaining_quantity() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);
    let (_, line_id) = order_with_line(&svc, "BO-101", item_id, 100);

    let release = svc.create_release(&operator(), line_id, 40, date(3, 1)).unwrap();
    assert_eq!(release.status, ReleaseStatus::Pending);
    assert_eq!(release.quantity, 40);
    assert_eq!(release.item_id, item_id);

    let line = svc.get_line(line_id).unwrap();
    assert_eq!(line.released_quantity, 40);
    assert_eq!(line.remaining_quantity, 60);

    let balance = svc.get_balance(item_id).unwrap();
    assert_eq!(balance.reserved_stock, 40);
    assert_eq!(balance.in_transit_stock, 0);
}

#[test]
fn over_release_is_rejected_and_changes_nothing() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);
    let (_, line_id) = order_with_line(&svc, "BO-102", item_id, 100);
    svc.create_release(&operator(), line_id, 40, date(3, 1)).unwrap();
    let before = svc.get_line(line_id).unwrap();

    let err = svc.create_release(&operator(), line_id, 70, date(3, 2)).unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::InsufficientRemainingQuantity {
            remaining: 60,
            requested: 70
        }
    );
    assert_eq!(svc.get_line(line_id).unwrap(), before);
    assert_eq!(svc.list_releases(line_id).unwrap().len(), 1);
}

#[test]
fn release_input_is_validated() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);
    let (_, line_id) = order_with_line(&svc, "BO-103", item_id, 100);

    assert!(matches!(
        svc.create_release(&operator(), line_id, 0, date(3, 1)),
        Err(FulfillmentError::Validation(_))
    ));
    assert_eq!(
        svc.create_release(&operator(), OrderLineId::generate(), 5, date(3, 1)),
        Err(FulfillmentError::NotFound("order line"))
    );
    assert_eq!(
        svc.list_releases(OrderLineId::generate()),
        Err(FulfillmentError::NotFound("order line"))
    );
}

#[test]
fn blanket_order_end_to_end() {
    let svc = service();
    let item_id = stocked_item(&svc, 1000);
    let (order, line_id) = order_with_line(&svc, "BO-1", item_id, 500);

    let release = svc.create_release(&operator(), line_id, 200, date(2, 15)).unwrap();
    let shipped = svc
        .update_release_status(&operator(), release.release_id, ReleaseStatus::Shipped)
        .unwrap();
    assert_eq!(shipped.status, ReleaseStatus::Shipped);
    assert!(shipped.shipped_at.is_some());
    assert_eq!(svc.get_balance(item_id).unwrap().in_transit_stock, 200);

    let delivered = svc
        .update_release_status(&operator(), release.release_id, ReleaseStatus::Delivered)
        .unwrap();
    assert_eq!(delivered.status, ReleaseStatus::Delivered);
    assert!(delivered.actual_delivery_date.is_some());

    let balance = svc.get_balance(item_id).unwrap();
    assert_eq!(balance.available_stock, 800);
    assert_eq!(balance.in_transit_stock, 0);

    let movements = svc.list_movements(Some(item_id)).unwrap();
    let last = movements.last().unwrap();
    assert_eq!(last.direction, MovementDirection::Out);
    assert_eq!(last.quantity, 200);
    assert_eq!(last.balance_after, 800);
    assert_eq!(last.reference_type, ReferenceType::Release);
    assert_eq!(last.reference_id, release.release_id.to_string());

    let line = svc.get_line(line_id).unwrap();
    assert_eq!(line.delivered_quantity, 200);
    assert_eq!(line.released_quantity, 200);
    assert_eq!(line.remaining_quantity, 300);
    assert_eq!(svc.get_order(order.order_id).unwrap().lines[0], line);

    assert!(svc.audit_line(line_id).unwrap().consistent);
    let audit = svc.audit_item(item_id).unwrap();
    assert!(audit.consistent, "{audit:?}");
    assert_eq!(audit.replayed_balance, Some(800));
}

#[test]
fn delivering_twice_deducts_once() {
    let svc = service();
    let item_id = stocked_item(&svc, 1000);
    let (_, line_id) = order_with_line(&svc, "BO-104", item_id, 500);
    let release = svc.create_release(&operator(), line_id, 200, date(2, 15)).unwrap();
    ship_and_deliver(&svc, release.release_id).unwrap();

    let err = svc
        .update_release_status(&operator(), release.release_id, ReleaseStatus::Delivered)
        .unwrap_err();
    assert_eq!(err, FulfillmentError::AlreadyDelivered);

    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 800);
    let release_movements = svc
        .list_movements(Some(item_id))
        .unwrap()
        .into_iter()
        .filter(|m| m.reference_type == ReferenceType::Release)
        .count();
    assert_eq!(release_movements, 1);
    assert_eq!(svc.get_line(line_id).unwrap().delivered_quantity, 200);
}

#[test]
fn delivery_without_stock_leaves_release_shipped() {
    let svc = service();
    let item_id = stocked_item(&svc, 50);
    let (_, line_id) = order_with_line(&svc, "BO-105", item_id, 500);
    let release = svc.create_release(&operator(), line_id, 100, date(2, 15)).unwrap();
    svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Shipped)
        .unwrap();

    let err = svc
        .update_release_status(&operator(), release.release_id, ReleaseStatus::Delivered)
        .unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::InsufficientStock {
            available: 50,
            requested: 100
        }
    );

    assert_eq!(svc.get_release(release.release_id).unwrap().status, ReleaseStatus::Shipped);
    assert_eq!(svc.get_line(line_id).unwrap().delivered_quantity, 0);
    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 50);
    assert_eq!(svc.list_movements(Some(item_id)).unwrap().len(), 1);
}

#[test]
fn release_status_moves_one_step_at_a_time() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    let (_, line_id) = order_with_line(&svc, "BO-106", item_id, 100);
    let release = svc.create_release(&operator(), line_id, 10, date(2, 15)).unwrap();

    assert!(matches!(
        svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Delivered),
        Err(FulfillmentError::InvalidStatusTransition { .. })
    ));
    assert!(matches!(
        svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Pending),
        Err(FulfillmentError::InvalidStatusTransition { .. })
    ));

    svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Shipped)
        .unwrap();
    assert_eq!(
        svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Shipped),
        Err(FulfillmentError::InvalidStatusTransition {
            from: "SHIPPED".to_string(),
            to: "SHIPPED".to_string()
        })
    );
    assert!(matches!(
        svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Pending),
        Err(FulfillmentError::InvalidStatusTransition { .. })
    ));

    assert_eq!(
        svc.update_release_status(&operator(), ReleaseId::generate(), ReleaseStatus::Shipped),
        Err(FulfillmentError::NotFound("release"))
    );
}

#[test]
fn manual_deduction_respects_available_stock() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);

    let movement = svc
        .deduct(
            &supervisor(),
            DeductStock {
                item_id,
                quantity: 30,
                reference_type: ReferenceType::Transfer,
                reference_id: "TR-9".to_string(),
            },
        )
        .unwrap();
    assert_eq!(movement.direction, MovementDirection::Out);
    assert_eq!(movement.quantity, 30);
    assert_eq!(movement.balance_after, 70);

    let err = svc
        .deduct(
            &supervisor(),
            DeductStock {
                item_id,
                quantity: 80,
                reference_type: ReferenceType::Transfer,
                reference_id: "TR-10".to_string(),
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::InsufficientStock {
            available: 70,
            requested: 80
        }
    );

    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 70);
    assert_eq!(svc.list_movements(Some(item_id)).unwrap().len(), 2);
}

#[test]
fn manual_movements_are_validated() {
    let svc = service();
    let item_id = stocked_item(&svc, 10);

    let release_ref = svc.deduct(
        &supervisor(),
        DeductStock {
            item_id,
            quantity: 1,
            reference_type: ReferenceType::Release,
            reference_id: ReleaseId::generate().to_string(),
        },
    );
    assert!(matches!(release_ref, Err(FulfillmentError::Validation(_))));

    let no_reason = svc.adjust(
        &supervisor(),
        AdjustStock {
            item_id,
            direction: MovementDirection::In,
            quantity: 5,
            reason: "  ".to_string(),
            reference_type: ReferenceType::Correction,
            reference_id: "CNT-1".to_string(),
        },
    );
    assert!(matches!(no_reason, Err(FulfillmentError::Validation(_))));

    let unknown = svc.deduct(
        &supervisor(),
        DeductStock {
            item_id: ItemId::generate(),
            quantity: 1,
            reference_type: ReferenceType::Correction,
            reference_id: "CNT-2".to_string(),
        },
    );
    assert_eq!(unknown, Err(FulfillmentError::NotFound("inventory item")));

    assert_eq!(svc.list_movements(Some(item_id)).unwrap().len(), 1);
}

#[test]
fn registering_twice_is_rejected() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);

    let err = svc
        .register_item(&supervisor(), item_id, "Hex bolt M8", StockPolicy::default())
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
}

#[test]
fn duplicate_order_numbers_are_rejected() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);
    order_with_line(&svc, "BO-7", item_id, 10);

    let err = svc
        .create_order(
            &supervisor(),
            header(" bo-7 "),
            vec![NewLine {
                item_id,
                total_quantity: 10,
            }],
        )
        .unwrap_err();
    assert_eq!(err, FulfillmentError::DuplicateOrderNumber("bo-7".to_string()));
    assert_eq!(svc.list_available_lines().len(), 1);
}

#[test]
fn order_creation_is_all_or_nothing() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);

    let unknown_item = svc.create_order(
        &supervisor(),
        header("BO-200"),
        vec![
            NewLine {
                item_id,
                total_quantity: 10,
            },
            NewLine {
                item_id: ItemId::generate(),
                total_quantity: 10,
            },
        ],
    );
    assert_eq!(unknown_item, Err(FulfillmentError::NotFound("inventory item")));

    let zero_line = svc.create_order(
        &supervisor(),
        header("BO-200"),
        vec![
            NewLine {
                item_id,
                total_quantity: 10,
            },
            NewLine {
                item_id,
                total_quantity: 0,
            },
        ],
    );
    assert!(matches!(zero_line, Err(FulfillmentError::Validation(_))));

    let mut backwards = header("BO-200");
    backwards.start_date = date(6, 1);
    backwards.end_date = date(5, 1);
    assert!(matches!(
        svc.create_order(&supervisor(), backwards, vec![NewLine { item_id, total_quantity: 10 }]),
        Err(FulfillmentError::Validation(_))
    ));

    assert!(svc.list_available_lines().is_empty());
    // The number was never claimed.
    order_with_line(&svc, "BO-200", item_id, 10);
}

#[test]
fn cancelled_orders_take_no_new_releases() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    let (order, line_id) = order_with_line(&svc, "BO-108", item_id, 100);
    let release = svc.create_release(&operator(), line_id, 10, date(2, 1)).unwrap();

    let cancelled = svc.cancel_order(&manager(), order.order_id).unwrap();
    assert_eq!(cancelled.status, BlanketOrderStatus::Cancelled);
    assert!(svc.list_available_lines().is_empty());

    assert!(matches!(
        svc.create_release(&operator(), line_id, 10, date(2, 2)),
        Err(FulfillmentError::Validation(_))
    ));

    // Work already scheduled can still be fulfilled.
    ship_and_deliver(&svc, release.release_id).unwrap();
    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 90);

    assert!(matches!(
        svc.cancel_order(&manager(), order.order_id),
        Err(FulfillmentError::InvalidStatusTransition { .. })
    ));
}

#[test]
fn orders_complete_only_when_fully_delivered() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    let (order, line_id) = order_with_line(&svc, "BO-109", item_id, 30);

    let first = svc.create_release(&operator(), line_id, 10, date(2, 1)).unwrap();
    ship_and_deliver(&svc, first.release_id).unwrap();
    assert!(matches!(
        svc.complete_order(&manager(), order.order_id),
        Err(FulfillmentError::InvalidStatusTransition { .. })
    ));

    let rest = svc.create_release(&operator(), line_id, 20, date(3, 1)).unwrap();
    ship_and_deliver(&svc, rest.release_id).unwrap();

    let completed = svc.complete_order(&manager(), order.order_id).unwrap();
    assert_eq!(completed.status, BlanketOrderStatus::Completed);
    assert_eq!(completed.lines[0].delivered_quantity, 30);
}

#[test]
fn authorization_is_checked_before_any_write() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    let (order, line_id) = order_with_line(&svc, "BO-110", item_id, 100);

    assert!(matches!(
        svc.create_order(&operator(), header("BO-111"), vec![NewLine { item_id, total_quantity: 1 }]),
        Err(FulfillmentError::Unauthorized(_))
    ));
    assert!(matches!(
        svc.deduct(
            &operator(),
            DeductStock {
                item_id,
                quantity: 1,
                reference_type: ReferenceType::Correction,
                reference_id: "X".to_string(),
            }
        ),
        Err(FulfillmentError::Unauthorized(_))
    ));
    assert!(matches!(
        svc.cancel_order(&supervisor(), order.order_id),
        Err(FulfillmentError::Unauthorized(_))
    ));

    assert_eq!(svc.list_available_lines().len(), 1);
    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 100);
    assert_eq!(svc.get_order(order.order_id).unwrap().status, BlanketOrderStatus::Active);

    // Higher roles inherit lower permissions.
    svc.create_release(&manager(), line_id, 5, date(2, 1)).unwrap();
}

#[test]
fn store_outages_surface_as_transient_and_are_not_retried() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    svc.dispatcher().store().fail_next_commits(1);

    let err = svc
        .deduct(
            &supervisor(),
            DeductStock {
                item_id,
                quantity: 10,
                reference_type: ReferenceType::Correction,
                reference_id: "CNT-3".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Transient(_)));
    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 100);

    svc.deduct(
        &supervisor(),
        DeductStock {
            item_id,
            quantity: 10,
            reference_type: ReferenceType::Correction,
            reference_id: "CNT-3".to_string(),
        },
    )
    .unwrap();
    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 90);
}

#[test]
fn stock_cannot_be_adjusted_past_the_balance_range() {
    let svc = service();
    let item_id = stocked_item(&svc, i64::MAX);

    let err = svc
        .adjust(
            &supervisor(),
            AdjustStock {
                item_id,
                direction: MovementDirection::In,
                quantity: 1,
                reason: "late receipt".to_string(),
                reference_type: ReferenceType::Production,
                reference_id: "PRD-2".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)), "{err:?}");

    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, i64::MAX);
    let movements = svc.list_movements(Some(item_id)).unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(replay_balance(&movements), Ok(i64::MAX));
}

#[test]
fn reservations_beyond_the_balance_range_keep_read_models_usable() {
    let svc = service();
    let item_id = stocked_item(&svc, 0);
    let (_, first) = order_with_line(&svc, "BO-MAX-1", item_id, i64::MAX);
    let (_, second) = order_with_line(&svc, "BO-MAX-2", item_id, i64::MAX);

    svc.create_release(&operator(), first, i64::MAX, date(5, 1)).unwrap();
    svc.create_release(&operator(), second, i64::MAX, date(5, 2)).unwrap();

    let balance = svc.get_balance(item_id).unwrap();
    assert_eq!(balance.reserved_stock, i64::MAX);
    assert_eq!(balance.in_transit_stock, 0);
    assert!(svc.audit_line(second).unwrap().consistent);

    // Later writes still project normally.
    let (order, line_id) = order_with_line(&svc, "BO-MAX-3", item_id, 10);
    assert_eq!(svc.get_order(order.order_id).unwrap().lines[0].remaining_quantity, 10);
    assert!(svc.list_available_lines().iter().any(|l| l.line_id == line_id));
}

#[test]
fn movement_listing_spans_items_in_commit_order() {
    let svc = service();
    let a = stocked_item(&svc, 50);
    let b = stocked_item(&svc, 20);
    svc.deduct(
        &supervisor(),
        DeductStock {
            item_id: a,
            quantity: 5,
            reference_type: ReferenceType::Transfer,
            reference_id: "TR-1".to_string(),
        },
    )
    .unwrap();

    let all = svc.list_movements(None).unwrap();
    let items: Vec<ItemId> = all.iter().map(|m| m.item_id).collect();
    assert_eq!(items, vec![a, b, a]);

    let for_a = svc.list_movements(Some(a)).unwrap();
    assert_eq!(for_a.len(), 2);
    assert_eq!(replay_balance(&for_a), Ok(45));
    assert_eq!(
        svc.list_movements(Some(ItemId::generate())),
        Err(FulfillmentError::NotFound("inventory item"))
    );
}

#[test]
fn demand_history_follows_outbound_movements() {
    let svc = service();
    let item_id = stocked_item(&svc, 500);
    let (_, line_id) = order_with_line(&svc, "BO-112", item_id, 500);
    for qty in [40, 60] {
        let release = svc.create_release(&operator(), line_id, qty, date(2, 1)).unwrap();
        ship_and_deliver(&svc, release.release_id).unwrap();
    }

    let series = svc.demand_history(item_id).unwrap();
    assert_eq!(series.item_id, item_id);
    assert_eq!(series.total(), 100);
}

#[test]
fn read_models_rebuild_from_the_log() {
    let svc = service();
    let item_id = stocked_item(&svc, 100);
    let (_, line_id) = order_with_line(&svc, "BO-113", item_id, 100);
    let release = svc.create_release(&operator(), line_id, 25, date(2, 1)).unwrap();
    ship_and_deliver(&svc, release.release_id).unwrap();

    let lines = svc.list_available_lines();
    let movements = svc.list_movements(None).unwrap();
    let position = svc.read_models().position();

    svc.read_models().rebuild(svc.dispatcher().store()).unwrap();

    assert_eq!(svc.list_available_lines(), lines);
    assert_eq!(svc.list_movements(None).unwrap(), movements);
    assert_eq!(svc.read_models().position(), position);
    assert_eq!(svc.list_releases(line_id).unwrap().len(), 1);
}

#[test]
fn concurrent_releases_never_oversubscribe_a_line() {
    let svc = contended_service();
    let item_id = stocked_item(&svc, 0);
    let (_, line_id) = order_with_line(&svc, "BO-120", item_id, 100);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let svc = svc.clone();
            thread::spawn(move || svc.create_release(&operator(), line_id, 15, date(4, 1)))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted = results.iter().filter(|r| r.is_ok()).count() as i64;
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                err,
                FulfillmentError::InsufficientRemainingQuantity { .. } | FulfillmentError::RetryableConflict(_)
            ),
            "unexpected error: {err:?}"
        );
    }

    let line = svc.get_line(line_id).unwrap();
    assert!(granted <= 6);
    assert_eq!(line.released_quantity, granted * 15);
    assert_eq!(line.remaining_quantity, 100 - granted * 15);
    assert_eq!(svc.list_releases(line_id).unwrap().len() as i64, granted);
    assert!(svc.audit_line(line_id).unwrap().consistent);
}

#[test]
fn concurrent_deliveries_of_one_release_deduct_once() {
    let svc = contended_service();
    let item_id = stocked_item(&svc, 1000);
    let (_, line_id) = order_with_line(&svc, "BO-121", item_id, 500);
    let release = svc.create_release(&operator(), line_id, 200, date(4, 1)).unwrap();
    svc.update_release_status(&operator(), release.release_id, ReleaseStatus::Shipped)
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            let release_id = release.release_id;
            thread::spawn(move || svc.update_release_status(&operator(), release_id, ReleaseStatus::Delivered))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, FulfillmentError::AlreadyDelivered | FulfillmentError::RetryableConflict(_)),
            "unexpected error: {err:?}"
        );
    }

    assert_eq!(svc.get_balance(item_id).unwrap().available_stock, 800);
    assert_eq!(svc.get_line(line_id).unwrap().delivered_quantity, 200);
    assert!(svc.audit_item(item_id).unwrap().consistent);
}

#[test]
fn concurrent_deductions_never_overdraw_an_item() {
    let svc = contended_service();
    let item_id = stocked_item(&svc, 100);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let svc = svc.clone();
            thread::spawn(move || {
                svc.deduct(
                    &supervisor(),
                    DeductStock {
                        item_id,
                        quantity: 10,
                        reference_type: ReferenceType::Transfer,
                        reference_id: format!("TR-{i}"),
                    },
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted = results.iter().filter(|r| r.is_ok()).count() as i64;
    assert!(granted <= 10);

    let balance = svc.get_balance(item_id).unwrap().available_stock;
    assert_eq!(balance, 100 - granted * 10);
    assert!(balance >= 0);

    let movements = svc.list_movements(Some(item_id)).unwrap();
    assert_eq!(replay_balance(&movements), Ok(balance));
}

#[test]
fn concurrent_creates_claim_an_order_number_once() {
    let svc = contended_service();
    let item_id = stocked_item(&svc, 0);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let svc = svc.clone();
            thread::spawn(move || {
                svc.create_order(
                    &supervisor(),
                    header("RACE-1"),
                    vec![NewLine {
                        item_id,
                        total_quantity: 10,
                    }],
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, FulfillmentError::DuplicateOrderNumber(_) | FulfillmentError::RetryableConflict(_)),
            "unexpected error: {err:?}"
        );
    }
    assert_eq!(svc.list_available_lines().len(), 1);
}

#[test]
fn cancellation_racing_releases_admits_none_after_it() {
    let svc = contended_service();
    let item_id = stocked_item(&svc, 0);
    let (order, line_id) = order_with_line(&svc, "BO-122", item_id, 10_000);
    let start = Arc::new(Barrier::new(5));

    let schedulers: Vec<_> = (0..4)
        .map(|_| {
            let svc = svc.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                let mut granted = Vec::new();
                for _ in 0..50 {
                    match svc.create_release(&operator(), line_id, 5, date(4, 1)) {
                        Ok(release) => granted.push(release.release_id),
                        Err(FulfillmentError::Validation(_)) => break,
                        Err(FulfillmentError::RetryableConflict(_)) => continue,
                        Err(err) => panic!("unexpected error: {err:?}"),
                    }
                }
                granted
            })
        })
        .collect();

    let canceller = {
        let svc = svc.clone();
        let start = start.clone();
        thread::spawn(move || {
            start.wait();
            thread::yield_now();
            svc.cancel_order(&manager(), order.order_id)
        })
    };

    let granted: Vec<ReleaseId> = schedulers.into_iter().flat_map(|h| h.join().unwrap()).collect();
    assert_eq!(canceller.join().unwrap().unwrap().status, BlanketOrderStatus::Cancelled);

    // Commit order decides: every release must precede the cancellation in the log.
    let log = svc.dispatcher().store().load_since(0).unwrap();
    let cancelled_at = log
        .iter()
        .filter(|e| e.aggregate_id == order.order_id.aggregate_id() && e.aggregate_type == BlanketOrder::AGGREGATE_TYPE)
        .map(|e| e.global_position)
        .max()
        .unwrap();
    let scheduled: Vec<u64> = log
        .iter()
        .filter(|e| e.aggregate_type == Release::AGGREGATE_TYPE)
        .map(|e| e.global_position)
        .collect();
    assert_eq!(scheduled.len(), granted.len());
    assert!(
        scheduled.iter().all(|&position| position < cancelled_at),
        "release committed after cancellation: {scheduled:?} vs {cancelled_at}"
    );

    let line = svc.get_line(line_id).unwrap();
    assert_eq!(line.released_quantity, granted.len() as i64 * 5);
    assert_eq!(svc.list_releases(line_id).unwrap().len(), granted.len());
    assert!(matches!(
        svc.create_release(&operator(), line_id, 5, date(4, 2)),
        Err(FulfillmentError::Validation(_))
    ));
}

#[derive(Debug, Clone)]
enum Step {
    Release(i64),
    ShipOldest,
    DeliverOldest,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1i64..=80).prop_map(Step::Release),
        Just(Step::ShipOldest),
        Just(Step::DeliverOldest),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn quantities_are_conserved(steps in proptest::collection::vec(step(), 1..24)) {
        let svc = service();
        let item_id = stocked_item(&svc, 150);
        let (_, line_id) = order_with_line(&svc, "BO-P", item_id, 200);

        for step in steps {
            let releases = svc.list_releases(line_id).unwrap();
            // Rejections are expected along the way; only the invariants matter.
            let _ = match step {
                Step::Release(qty) => svc.create_release(&operator(), line_id, qty, date(5, 1)).map(|_| ()),
                Step::ShipOldest => match releases.iter().find(|r| r.status == ReleaseStatus::Pending) {
                    Some(r) => svc.update_release_status(&operator(), r.release_id, ReleaseStatus::Shipped).map(|_| ()),
                    None => Ok(()),
                },
                Step::DeliverOldest => match releases.iter().find(|r| r.status == ReleaseStatus::Shipped) {
                    Some(r) => svc.update_release_status(&operator(), r.release_id, ReleaseStatus::Delivered).map(|_| ()),
                    None => Ok(()),
                },
            };

            let line = svc.get_line(line_id).unwrap();
            prop_assert!(0 <= line.delivered_quantity);
            prop_assert!(line.delivered_quantity <= line.released_quantity);
            prop_assert!(line.released_quantity <= line.total_quantity);
            prop_assert_eq!(line.remaining_quantity, line.total_quantity - line.released_quantity);

            let balance = svc.get_balance(item_id).unwrap();
            prop_assert!(balance.available_stock >= 0);
            prop_assert_eq!(balance.available_stock, 150 - line.delivered_quantity);
        }

        prop_assert!(svc.audit_line(line_id).unwrap().consistent);
        prop_assert!(svc.audit_item(item_id).unwrap().consistent);
    }
}
