//! Concurrency tests for last-ticket scenarios.
//!
//! Many buyers race for a handful of units. Exactly as many orders complete as
//! there were units, and no ticket type ever goes below zero.
//!
//! Run with: `cargo test --test concurrency_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use boxoffice_core::EngineError;
use boxoffice_core::error::ErrorCategory;
use boxoffice_core::types::{Caller, PaymentStatus, Selection, UserId};
use common::{Harness, request};
use futures::future::join_all;
use std::sync::Arc;
use ticketing::IntakeOutcome;

/// 20 concurrent free orders for 5 units.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_free_orders_race_for_last_units() {
    let h = Arc::new(Harness::new());
    let (event, types) = h.free_event(&[5]).await;
    let selections = vec![Selection::new(types[0].id, 1)];

    let mut handles = Vec::new();
    for _ in 0..20 {
        let h = Arc::clone(&h);
        let order = request(&event, selections.clone());
        handles.push(tokio::spawn(async move {
            h.app.intake.place_order(Caller::buyer(UserId::new()), order).await
        }));
    }

    let mut completed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(IntakeOutcome::Completed(_)) => completed += 1,
            Ok(IntakeOutcome::AwaitingPayment(_)) => unreachable!("free orders never await payment"),
            Err(error) => {
                assert_eq!(error.category(), ErrorCategory::InventoryConflict, "unexpected error {error}");
                conflicts += 1;
            }
        }
    }

    println!("✓ {completed} completed, {conflicts} refused");
    assert_eq!(completed, 5);
    assert_eq!(conflicts, 15);
    assert_eq!(h.remaining(types[0].id).await, 0);
    assert_eq!(h.store.tickets_for_event(event.id).await.len(), 5);
}

/// 10 paid orders accepted optimistically, 3 units; callbacks arrive together.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paid_callbacks_race_for_last_units() {
    let h = Arc::new(Harness::new());
    let (event, types) = h.paid_event(&[(5_000, 3)]).await;

    let mut redirects = Vec::new();
    for _ in 0..10 {
        redirects.push(
            h.place_paid(Caller::buyer(UserId::new()), &event, vec![Selection::new(types[0].id, 1)])
                .await,
        );
    }

    let mut handles = Vec::new();
    for redirect in &redirects {
        let h = Arc::clone(&h);
        let reference = redirect.reference.clone();
        handles.push(tokio::spawn(async move {
            h.app.fulfillment.fulfill_by_reference(&reference).await
        }));
    }

    let mut fulfilled = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(outcome) => {
                assert_eq!(outcome.tickets.len(), 1);
                fulfilled += 1;
            }
            Err(error) => assert!(
                matches!(error, EngineError::InsufficientInventory { available: 0, .. }),
                "unexpected error {error}"
            ),
        }
    }

    assert_eq!(fulfilled, 3);
    assert_eq!(h.remaining(types[0].id).await, 0);
    assert_eq!(h.store.tickets_for_event(event.id).await.len(), 3);

    // Losers keep their pending order for manual reconciliation
    let pending = h
        .store
        .orders_for_event(event.id)
        .await
        .into_iter()
        .filter(|o| o.payment_status == PaymentStatus::Pending)
        .count();
    assert_eq!(pending, 7);
}

/// The same callback delivered many times at once issues tickets once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_callbacks_issue_once() {
    let h = Arc::new(Harness::new());
    let (event, types) = h.paid_event(&[(5_000, 10)]).await;
    let redirect = h
        .place_paid(Caller::buyer(UserId::new()), &event, vec![Selection::new(types[0].id, 2)])
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        let reference = redirect.reference.clone();
        handles.push(tokio::spawn(async move {
            h.app.fulfillment.fulfill_by_reference(&reference).await
        }));
    }

    let mut fresh = 0;
    let mut ticket_sets = Vec::new();
    for joined in join_all(handles).await {
        let outcome = joined.expect("task panicked").expect("every callback succeeds");
        if !outcome.already_completed {
            fresh += 1;
        }
        ticket_sets.push(outcome.tickets);
    }

    assert_eq!(fresh, 1);
    assert!(ticket_sets.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(h.remaining(types[0].id).await, 8);
    assert_eq!(h.store.tickets_for_event(event.id).await.len(), 2);
}
