//! Refund processor tests.
//!
//! Authorization, the initiate/approve/reject state machine, inventory
//! restoration and gateway failure handling.
//!
//! Run with: `cargo test --test refund_test`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use boxoffice_core::EngineError;
use boxoffice_core::gateway::{PaymentGatewayError, RefundOutcome};
use boxoffice_core::notifier::NotificationKind;
use boxoffice_core::store::OrderStore;
use boxoffice_core::types::{Caller, PaymentStatus, RefundStatus, Selection, TicketStatus, UserId};
use common::Harness;
use ticketing::RefundDecision;

#[tokio::test]
async fn test_approved_refund_restores_inventory_per_type() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10), (2_500, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let bought = h
        .buy(
            buyer,
            &event,
            vec![Selection::new(types[0].id, 2), Selection::new(types[1].id, 1)],
        )
        .await;
    assert_eq!(h.remaining(types[0].id).await, 8);
    assert_eq!(h.remaining(types[1].id).await, 9);

    let initiated = h
        .app
        .refunds
        .initiate(buyer, bought.order.id, "Can no longer attend")
        .await
        .unwrap();
    assert_eq!(initiated.refund_status, Some(RefundStatus::Initiated));
    assert_eq!(initiated.refund_reason.as_deref(), Some("Can no longer attend"));
    assert_eq!(initiated.payment_status, PaymentStatus::Completed);

    let refunded = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.refund_status, Some(RefundStatus::Processed));
    assert_eq!(h.remaining(types[0].id).await, 10);
    assert_eq!(h.remaining(types[1].id).await, 10);

    let tickets = h.store.tickets_for_order(bought.order.id).await.unwrap();
    assert_eq!(tickets.len(), 3);
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Refunded));

    let transaction_reference = bought.order.transaction_reference.clone().unwrap();
    assert_eq!(h.gateway.refunds(), vec![(transaction_reference, bought.order.total_amount)]);

    assert_eq!(h.notifier.of_kind(NotificationKind::RefundRequested).len(), 1);
    assert_eq!(h.notifier.of_kind(NotificationKind::RefundProcessed).len(), 1);
}

#[tokio::test]
async fn test_only_buyer_organizer_or_admin_may_initiate() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 1)]).await;

    let stranger = Caller::buyer(UserId::new());
    let result = h.app.refunds.initiate(stranger, bought.order.id, "mine now").await;
    assert!(matches!(result, Err(EngineError::Unauthorized { user_id, .. }) if user_id == stranger.user_id));

    let organizer = Caller::organizer(event.organizer_id);
    let initiated = h
        .app
        .refunds
        .initiate(organizer, bought.order.id, "Event rescheduled")
        .await
        .unwrap();
    assert_eq!(initiated.refund_status, Some(RefundStatus::Initiated));
}

#[tokio::test]
async fn test_only_admins_process_refunds() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.refunds.initiate(buyer, bought.order.id, "Sick").await.unwrap();

    for caller in [buyer, Caller::organizer(event.organizer_id)] {
        let result = h
            .app
            .refunds
            .process(caller, bought.order.id, RefundDecision::Approve)
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));
    }
    assert!(h.gateway.refunds().is_empty());
    assert_eq!(h.remaining(types[0].id).await, 9);
}

#[tokio::test]
async fn test_rejected_refund_clears_request() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());
    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 1)]).await;
    h.app.refunds.initiate(buyer, bought.order.id, "Changed mind").await.unwrap();

    let rejected = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Reject)
        .await
        .unwrap();

    assert_eq!(rejected.payment_status, PaymentStatus::Completed);
    assert_eq!(rejected.refund_status, None);
    assert_eq!(rejected.refund_reason, None);
    assert_eq!(h.remaining(types[0].id).await, 9);
    assert!(h.gateway.refunds().is_empty());

    // The buyer may ask again
    h.app.refunds.initiate(buyer, bought.order.id, "Really sick").await.unwrap();
}

#[tokio::test]
async fn test_gateway_refusal_changes_nothing() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());
    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 2)]).await;
    h.app.refunds.initiate(buyer, bought.order.id, "Sick").await.unwrap();

    h.gateway.set_refund_result(Ok(RefundOutcome::Failed));
    let result = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await;
    assert!(matches!(result, Err(EngineError::RefundGatewayFailed { .. })));

    h.gateway.set_refund_result(Err(PaymentGatewayError::Unavailable {
        message: "503".to_string(),
    }));
    let result = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await;
    assert!(matches!(result, Err(EngineError::RefundGatewayFailed { .. })));

    let order = h.store.order(bought.order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.refund_status, Some(RefundStatus::Initiated));
    assert_eq!(h.remaining(types[0].id).await, 8);
    let tickets = h.store.tickets_for_order(bought.order.id).await.unwrap();
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Unused));

    // Once the gateway recovers the same request goes through
    h.gateway.set_refund_result(Ok(RefundOutcome::Success));
    let refunded = h
        .app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.remaining(types[0].id).await, 10);
}

#[tokio::test]
async fn test_refund_state_machine_guards() {
    let h = Harness::new();
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    // Pending orders cannot be refunded
    let pending = h.place_paid(buyer, &event, vec![Selection::new(types[0].id, 1)]).await;
    let result = h.app.refunds.initiate(buyer, pending.order_id, "early").await;
    assert_eq!(
        result,
        Err(EngineError::InvalidOrderState {
            order_id: pending.order_id,
            status: PaymentStatus::Pending
        })
    );

    let bought = h.buy(buyer, &event, vec![Selection::new(types[0].id, 1)]).await;

    // Nothing to process before initiation
    let result = h.app.refunds.process(admin, bought.order.id, RefundDecision::Approve).await;
    assert!(matches!(result, Err(EngineError::RefundNotAllowed { .. })));

    h.app.refunds.initiate(buyer, bought.order.id, "Sick").await.unwrap();
    let result = h.app.refunds.initiate(buyer, bought.order.id, "Sick again").await;
    assert!(matches!(result, Err(EngineError::RefundNotAllowed { .. })));

    h.app
        .refunds
        .process(admin, bought.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    // A refunded order is final
    let result = h.app.refunds.process(admin, bought.order.id, RefundDecision::Approve).await;
    assert!(matches!(result, Err(EngineError::RefundNotAllowed { .. })));
    let result = h.app.refunds.initiate(buyer, bought.order.id, "once more").await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidOrderState {
            status: PaymentStatus::Refunded,
            ..
        })
    ));
    assert_eq!(h.gateway.refunds().len(), 1);
}

#[tokio::test]
async fn test_free_order_refund_skips_gateway() {
    let h = Harness::new();
    let (event, types) = h.free_event(&[5]).await;
    let buyer = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    let fulfilled = h.place_free(buyer, &event, vec![Selection::new(types[0].id, 2)]).await;
    h.app.refunds.initiate(buyer, fulfilled.order.id, "Plans changed").await.unwrap();
    let refunded = h
        .app
        .refunds
        .process(admin, fulfilled.order.id, RefundDecision::Approve)
        .await
        .unwrap();

    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.remaining(types[0].id).await, 5);
    assert_eq!(h.gateway.total_calls(), 0);
}
