//! Shared harness for the engine integration tests.
//!
//! Wires a [`BoxOffice`] over the in-memory store, the scripted gateway, a
//! recording notifier, a flat 5% fee and a fixed clock.

#![allow(dead_code)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use boxoffice_core::environment::Clock;
use boxoffice_core::types::{BasisPoints, Caller, Event, Selection, TicketType, TicketTypeId};
use boxoffice_testing::{FixedClock, FlatFeeCalculator, RecordingNotifier, ScriptedPaymentGateway, fixtures, test_clock};
use std::sync::Arc;
use ticketing::{BoxOffice, Config, EngineEnvironment, FulfillmentOutcome, IntakeOutcome, MemoryStore, OrderRequest, PaymentRedirect};

/// Platform fee applied by the harness.
pub const FEE_BPS: u32 = 500;

pub struct Harness {
    pub app: BoxOffice,
    pub store: MemoryStore,
    pub gateway: ScriptedPaymentGateway,
    pub notifier: RecordingNotifier,
    pub clock: FixedClock,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Config::default(), RecordingNotifier::new())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        Self::build(Config::default(), notifier)
    }

    /// Adjust the wired environment before the engine is assembled.
    pub fn with_environment(adjust: impl FnOnce(&mut EngineEnvironment)) -> Self {
        Self::assemble(Config::default(), RecordingNotifier::new(), adjust)
    }

    fn build(config: Config, notifier: RecordingNotifier) -> Self {
        Self::assemble(config, notifier, |_| {})
    }

    fn assemble(config: Config, notifier: RecordingNotifier, adjust: impl FnOnce(&mut EngineEnvironment)) -> Self {
        boxoffice_testing::init_tracing();
        let store = MemoryStore::new();
        let gateway = ScriptedPaymentGateway::new();
        let clock = test_clock();
        let mut env = EngineEnvironment::new(
            &config,
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(notifier.clone()),
            Arc::new(FlatFeeCalculator(BasisPoints::new(FEE_BPS))),
            Arc::new(clock.clone()),
        )
        .expect("engine wiring");
        adjust(&mut env);
        let app = BoxOffice::from_environment(env);
        Self {
            app,
            store,
            gateway,
            notifier,
            clock,
            config,
        }
    }

    /// A published paid event with one ticket type per `(price, quantity)`.
    pub async fn paid_event(&self, tiers: &[(u64, u32)]) -> (Event, Vec<TicketType>) {
        let event = fixtures::published_event(self.clock.now());
        self.seed(event, tiers).await
    }

    /// A published free event with one ticket type per quantity.
    pub async fn free_event(&self, quantities: &[u32]) -> (Event, Vec<TicketType>) {
        let event = fixtures::free_event(self.clock.now());
        let tiers: Vec<(u64, u32)> = quantities.iter().map(|q| (0, *q)).collect();
        self.seed(event, &tiers).await
    }

    async fn seed(&self, event: Event, tiers: &[(u64, u32)]) -> (Event, Vec<TicketType>) {
        let types: Vec<TicketType> = tiers
            .iter()
            .enumerate()
            .map(|(i, (price, quantity))| fixtures::ticket_type(event.id, &format!("Tier {i}"), *price, *quantity))
            .collect();
        self.store.add_event(event.clone(), types.clone()).await;
        (event, types)
    }

    /// Place an order that must await payment.
    pub async fn place_paid(&self, buyer: Caller, event: &Event, selections: Vec<Selection>) -> PaymentRedirect {
        let outcome = self
            .app
            .intake
            .place_order(buyer, request(event, selections))
            .await
            .expect("order accepted");
        match outcome {
            IntakeOutcome::AwaitingPayment(redirect) => redirect,
            IntakeOutcome::Completed(_) => panic!("paid order completed without payment"),
        }
    }

    /// Place a free order that must complete synchronously.
    pub async fn place_free(&self, buyer: Caller, event: &Event, selections: Vec<Selection>) -> FulfillmentOutcome {
        let outcome = self
            .app
            .intake
            .place_order(buyer, request(event, selections))
            .await
            .expect("order accepted");
        match outcome {
            IntakeOutcome::Completed(fulfilled) => fulfilled,
            IntakeOutcome::AwaitingPayment(_) => panic!("free order asked for payment"),
        }
    }

    /// Place a paid order and settle it through the callback path.
    pub async fn buy(&self, buyer: Caller, event: &Event, selections: Vec<Selection>) -> FulfillmentOutcome {
        let redirect = self.place_paid(buyer, event, selections).await;
        self.app
            .fulfillment
            .fulfill_by_reference(&redirect.reference)
            .await
            .expect("payment settles")
    }

    pub async fn remaining(&self, ticket_type_id: TicketTypeId) -> u32 {
        self.store
            .ticket_type(ticket_type_id)
            .await
            .expect("ticket type exists")
            .quantity
    }
}

pub fn request(event: &Event, selections: Vec<Selection>) -> OrderRequest {
    OrderRequest {
        event_id: event.id,
        selections,
        notes: None,
    }
}
