//! Box Office Demo
//!
//! Runs the sell-out, refund and waiting-list scenario against the in-memory
//! store and the mock payment gateway:
//!
//! - Buyer A purchases the last ticket of a one-ticket event (paid path)
//! - Buyer B joins the waiting list
//! - A's order is refunded; inventory is restored
//! - The cascade offers the freed ticket to B for 24 hours
//! - A free event sells three tickets across two types synchronously
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//! ```

use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_core::store::OrderStore;
use boxoffice_core::types::{
    Caller, Event, EventId, Money, PublishStatus, Selection, TicketType, TicketTypeId, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use ticketing::fees::ConfiguredFeeCalculator;
use ticketing::notifications::LogNotifier;
use ticketing::payment_gateway::MockPaymentGateway;
use ticketing::{BoxOffice, Config, IntakeOutcome, MemoryStore, OrderRequest, RefundDecision};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn event(organizer_id: UserId, name: &str, is_free: bool, now: chrono::DateTime<chrono::Utc>) -> Event {
    Event {
        id: EventId::new(),
        organizer_id,
        name: name.to_string(),
        is_free,
        start_date_time: now + chrono::Duration::days(30),
        status: PublishStatus::Published,
        attendee_limit: None,
    }
}

fn ticket_type(event_id: EventId, name: &str, price_minor: u64, quantity: u32) -> TicketType {
    TicketType {
        id: TicketTypeId::new(),
        event_id,
        name: name.to_string(),
        price: Money::from_minor(price_minor),
        quantity,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // Initialize tracing; RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    ticketing::metrics::register_business_metrics();

    println!("\n🎫 ============================================");
    println!("   Box Office - Live Demo");
    println!("============================================\n");

    if config.uses_dev_signing_secret() {
        tracing::warn!("TICKET_SIGNING_SECRET not set; using the development key");
    }

    println!("⚙️  Initializing engine (in-memory store, mock gateway)...");
    let store = MemoryStore::new();
    let app = BoxOffice::new(
        &config,
        Arc::new(store.clone()),
        Arc::new(MockPaymentGateway::with_latency(Duration::from_millis(50))),
        Arc::new(LogNotifier),
        Arc::new(ConfiguredFeeCalculator::new(config.fees.default_rate())),
        Arc::new(SystemClock),
    )?;
    println!("✓ Engine ready\n");

    let now = SystemClock.now();
    let organizer = UserId::new();
    let buyer_a = Caller::buyer(UserId::new());
    let buyer_b = Caller::buyer(UserId::new());
    let admin = Caller::admin(UserId::new());

    // ========== Sell-out Scenario ==========

    println!("📋 Demo Scenario: Sell-out, refund, waiting list");
    let concert = event(organizer, "Intimate Acoustic Set", false, now);
    let front_row = ticket_type(concert.id, "Front Row", 5_000, 1);
    store.add_event(concert.clone(), vec![front_row.clone()]).await;
    println!("   Event: {} (1 × Front Row @ {})\n", concert.name, front_row.price);

    // Step 1: Buyer A orders the only ticket
    println!("1️⃣  Buyer A placing order...");
    let outcome = app
        .intake
        .place_order(
            buyer_a,
            OrderRequest {
                event_id: concert.id,
                selections: vec![Selection::new(front_row.id, 1)],
                notes: None,
            },
        )
        .await?;
    let IntakeOutcome::AwaitingPayment(redirect) = outcome else {
        return Err("paid order should await payment".into());
    };
    println!("   ✓ Order {} pending", redirect.order_id);
    println!("   ✓ Total {} (platform fee {})", redirect.total_amount, redirect.platform_fee);
    println!("   ✓ Redirect: {}\n", redirect.authorization_url);

    // Step 2: Gateway calls back
    println!("2️⃣  Payment callback...");
    let fulfilled = app.fulfillment.fulfill_by_reference(&redirect.reference).await?;
    for ticket in &fulfilled.tickets {
        println!("   ✓ Ticket issued: {}", ticket.ticket_code);
    }
    let remaining = store.ticket_type(front_row.id).await.map_or(0, |t| t.quantity);
    println!("   ✓ Front Row remaining: {remaining}\n");

    // Step 3: Buyer B joins the waiting list
    println!("3️⃣  Buyer B joining waiting list...");
    let entry = app.waiting_list.join(buyer_b, concert.id).await?;
    println!("   ✓ Entry {} is {}\n", entry.id, entry.status);

    // Step 4: Refund
    println!("4️⃣  Buyer A requests a refund; admin approves...");
    app.refunds
        .initiate(buyer_a, redirect.order_id, "Can no longer attend")
        .await?;
    let refunded = app
        .refunds
        .process(admin, redirect.order_id, RefundDecision::Approve)
        .await?;
    let remaining = store.ticket_type(front_row.id).await.map_or(0, |t| t.quantity);
    println!("   ✓ Order {} is {}", refunded.id, refunded.payment_status);
    println!("   ✓ Front Row remaining: {remaining}\n");

    // Step 5: Cascade result
    println!("5️⃣  Waiting list after cascade:");
    for entry in store.waiting_list(concert.id).await? {
        println!(
            "   📊 {} → {} (offer expires {:?})",
            entry.user_id, entry.status, entry.offer_expires_at
        );
    }
    println!();

    // ========== Free Event Scenario ==========

    println!("6️⃣  Free event: 3 tickets across 2 types...");
    let meetup = event(organizer, "Community Meetup", true, now);
    let general = ticket_type(meetup.id, "General", 0, 50);
    let speaker = ticket_type(meetup.id, "Speaker", 0, 5);
    store
        .add_event(meetup.clone(), vec![general.clone(), speaker.clone()])
        .await;

    let outcome = app
        .intake
        .place_order(
            buyer_b,
            OrderRequest {
                event_id: meetup.id,
                selections: vec![Selection::new(general.id, 2), Selection::new(speaker.id, 1)],
                notes: Some("Vegetarian".to_string()),
            },
        )
        .await?;
    if let IntakeOutcome::Completed(fulfilled) = outcome {
        println!(
            "   ✓ Order {} {} with {} tickets",
            fulfilled.order.id,
            fulfilled.order.payment_status,
            fulfilled.tickets.len()
        );
    }

    println!("\n✅ Demo complete\n");
    Ok(())
}
