//! Waiting list and cascade tests.
//!
//! Sell out, queue, refund, offer; offers lapse and move down the queue.
//!
//! Run with: `cargo test --test waiting_list_test`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use boxoffice_core::EngineError;
use boxoffice_core::environment::Clock;
use boxoffice_core::notifier::NotificationKind;
use boxoffice_core::types::{BasisPoints, Caller, EventId, PaymentStatus, Selection, UserId, WaitingListStatus};
use boxoffice_testing::{ConflictingStore, FixedClock, FlatFeeCalculator, RecordingNotifier, ScriptedPaymentGateway};
use chrono::Duration;
use common::Harness;
use std::sync::Arc;
use ticketing::config::{ConfigError, MAX_OFFER_WINDOW_HOURS};
use ticketing::{AppError, BoxOffice, Config, MemoryStore, RefundDecision, SweepReport};

#[tokio::test]
async fn test_refund_after_sell_out_offers_ticket_to_queue() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 1)]).await;
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h.buy(buyer_a, &event, vec![Selection::new(types[0].id, 1)]).await;
    assert_eq!(h.remaining(types[0].id).await, 0);

    let entry = h.app.waiting_list.join(buyer_b, event.id).await.unwrap();
    assert_eq!(entry.status, WaitingListStatus::Waiting);
    assert_eq!(entry.offer_expires_at, None);

    h.app.refunds.initiate(buyer_a, bought.order.id, "Can't make it").await.unwrap();
    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    assert_eq!(h.remaining(types[0].id).await, 1);
    let entries = h.app.waiting_list.entries(event.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, buyer_b.user_id);
    assert_eq!(entries[0].status, WaitingListStatus::Offered);
    assert_eq!(entries[0].offer_expires_at, Some(h.clock.now() + Duration::hours(24)));

    let offers = h.notifier.of_kind(NotificationKind::TicketAvailable);
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].user_id, buyer_b.user_id);
    assert_eq!(offers[0].event_id, event.id);
    assert_eq!(offers[0].offer_expires_at, entries[0].offer_expires_at);
}

#[tokio::test]
async fn test_cascade_offers_oldest_entries_up_to_available_units() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 2)]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());
    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 2)]).await;

    let queued: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
    for user in &queued {
        h.app.waiting_list.join(Caller::buyer(*user), event.id).await.unwrap();
        h.clock.advance(Duration::seconds(1));
    }

    h.app.refunds.initiate(buyer, bought.order.id, "Group cancelled").await.unwrap();
    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    let entries = h.app.waiting_list.entries(event.id).await.unwrap();
    let statuses: Vec<(UserId, WaitingListStatus)> = entries.iter().map(|e| (e.user_id, e.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (queued[0], WaitingListStatus::Offered),
            (queued[1], WaitingListStatus::Offered),
            (queued[2], WaitingListStatus::Waiting),
        ]
    );
}

#[tokio::test]
async fn test_join_is_refused_while_tickets_remain() {
    let h = Harness::new();
    let (event, _) = h.paid_event(&[(5_000, 3)]).await;

    let result = h.app.waiting_list.join(Caller::buyer(UserId::new()), event.id).await;

    assert!(matches!(result, Err(EngineError::WaitingListConflict { .. })));
}

#[tokio::test]
async fn test_join_allowed_when_attendee_limit_reached() {
    let h = Harness::new();
    let (mut event, types) = h.paid_event(&[(5_000, 10)]).await;
    event.attendee_limit = Some(1);
    h.store.update_event(event.clone()).await;
    h.buy(Caller::buyer(UserId::new()), &event, vec![Selection::new(types[0].id, 1)])
        .await;

    let entry = h.app.waiting_list.join(Caller::buyer(UserId::new()), event.id).await.unwrap();

    assert_eq!(entry.status, WaitingListStatus::Waiting);
}

#[tokio::test]
async fn test_one_live_entry_per_buyer() {
    let h = Harness::new();
    let (event, _) = h.paid_event(&[(5_000, 0)]).await;
    let buyer = Caller::buyer(UserId::new());

    h.app.waiting_list.join(buyer, event.id).await.unwrap();
    let again = h.app.waiting_list.join(buyer, event.id).await;
    assert!(matches!(again, Err(EngineError::WaitingListConflict { .. })));

    let left = h.app.waiting_list.leave(buyer, event.id).await.unwrap();
    assert_eq!(left.status, WaitingListStatus::Expired);
    let again = h.app.waiting_list.leave(buyer, event.id).await;
    assert!(matches!(again, Err(EngineError::WaitingListConflict { .. })));

    // Leaving frees the slot for a fresh entry at the back of the queue
    let rejoined = h.app.waiting_list.join(buyer, event.id).await.unwrap();
    assert_ne!(rejoined.id, left.id);
    assert_eq!(h.app.waiting_list.entries(event.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_join_unknown_event() {
    let h = Harness::new();
    let missing = EventId::new();

    let result = h.app.waiting_list.join(Caller::buyer(UserId::new()), missing).await;

    assert_eq!(result, Err(EngineError::EventNotFound(missing)));
}

#[tokio::test]
async fn test_lapsed_offer_moves_to_next_in_queue() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 1)]).await;
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let buyer_c = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h.buy(buyer_a, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.waiting_list.join(buyer_b, event.id).await.unwrap();
    h.clock.advance(Duration::seconds(1));
    h.app.waiting_list.join(buyer_c, event.id).await.unwrap();

    h.app.refunds.initiate(buyer_a, bought.order.id, "Sick").await.unwrap();
    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    // Nothing has lapsed yet
    let report = h.app.waiting_list.sweep_expired_offers(h.clock.now()).await.unwrap();
    assert_eq!(report, SweepReport::default());

    h.clock.advance(Duration::hours(25));
    let report = h.app.waiting_list.sweep_expired_offers(h.clock.now()).await.unwrap();

    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].user_id, buyer_b.user_id);
    assert_eq!(report.expired[0].status, WaitingListStatus::Expired);
    assert_eq!(report.offered.len(), 1);
    assert_eq!(report.offered[0].user_id, buyer_c.user_id);
    assert_eq!(report.offered[0].offer_expires_at, Some(h.clock.now() + Duration::hours(24)));
}

#[tokio::test]
async fn test_purchase_converts_the_offer() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 1)]).await;
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h.buy(buyer_a, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.waiting_list.join(buyer_b, event.id).await.unwrap();
    h.app.refunds.initiate(buyer_a, bought.order.id, "Sick").await.unwrap();
    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    h.buy(buyer_b, &event, vec![Selection::new(types[0].id, 1)]).await;

    let entries = h.app.waiting_list.entries(event.id).await.unwrap();
    assert_eq!(entries[0].status, WaitingListStatus::Converted);
    assert_eq!(h.remaining(types[0].id).await, 0);

    // A converted offer is not swept
    h.clock.advance(Duration::hours(48));
    let report = h.app.waiting_list.sweep_expired_offers(h.clock.now()).await.unwrap();
    assert!(report.expired.is_empty());
}

#[tokio::test]
async fn test_purchase_without_offer_keeps_waiting_entry() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 1)]).await;
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let buyer_c = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h.buy(buyer_a, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.waiting_list.join(buyer_b, event.id).await.unwrap();
    h.clock.advance(Duration::seconds(1));
    h.app.waiting_list.join(buyer_c, event.id).await.unwrap();
    h.app.refunds.initiate(buyer_a, bought.order.id, "Sick").await.unwrap();
    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    // C is still queued behind B's offer but buys the freed unit first
    h.buy(buyer_c, &event, vec![Selection::new(types[0].id, 1)]).await;

    let entries = h.app.waiting_list.entries(event.id).await.unwrap();
    let statuses: Vec<(UserId, WaitingListStatus)> = entries.iter().map(|e| (e.user_id, e.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (buyer_b.user_id, WaitingListStatus::Offered),
            (buyer_c.user_id, WaitingListStatus::Waiting),
        ]
    );
}

#[tokio::test]
async fn test_store_conflict_on_join_reads_as_already_queued() {
    let mut wrapped = None;
    let h = Harness::with_environment(|env| {
        let store = ConflictingStore::new(Arc::clone(&env.store), 0);
        env.store = Arc::new(store.clone());
        wrapped = Some(store);
    });
    let store = wrapped.unwrap();
    let (event, _) = h.paid_event(&[(5_000, 0)]).await;
    let buyer = Caller::buyer(UserId::new());

    // A concurrent join committed first; only the unique index notices
    store.fail_waiting_entry_saves(1);
    let result = h.app.waiting_list.join(buyer, event.id).await;

    assert!(
        matches!(result, Err(EngineError::WaitingListConflict { .. })),
        "unexpected result {result:?}"
    );
    assert_eq!(store.injected(), 1);
    assert!(h.app.waiting_list.entries(event.id).await.unwrap().is_empty());
}

#[test]
fn test_out_of_range_offer_window_is_rejected_at_wiring() {
    for hours in [0, -1, MAX_OFFER_WINDOW_HOURS + 1, 1_000_000_000_000] {
        let mut config = Config::default();
        config.waiting_list.offer_window_hours = hours;

        let result = BoxOffice::new(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedPaymentGateway::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(FlatFeeCalculator(BasisPoints::new(500))),
            Arc::new(FixedClock::new(chrono::Utc::now())),
        );

        assert!(
            matches!(result, Err(AppError::Config(ConfigError::OfferWindowOutOfRange(h))) if h == hours),
            "window of {hours} hours accepted"
        );
    }
}

#[tokio::test]
async fn test_unrepresentable_offer_expiry_leaves_refund_committed() {
    let h = Harness::with_environment(|env| env.settings.offer_window = chrono::TimeDelta::MAX);
    let (event, types) = h.paid_event(&[(5_000, 1)]).await;
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h.buy(buyer_a, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.waiting_list.join(buyer_b, event.id).await.unwrap();
    h.app.refunds.initiate(buyer_a, bought.order.id, "Sick").await.unwrap();

    let refunded = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.remaining(types[0].id).await, 1);
    let entries = h.app.waiting_list.entries(event.id).await.unwrap();
    assert_eq!(entries[0].status, WaitingListStatus::Waiting);
    assert!(h.notifier.of_kind(NotificationKind::TicketAvailable).is_empty());

    let result = h.app.cascade.run(event.id).await;
    assert!(matches!(result, Err(EngineError::WaitingListConflict { .. })));
}
