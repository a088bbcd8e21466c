//! Box office - order fulfillment & inventory allocation engine
//!
//! Sells finite-inventory tickets against scheduled events, collects payment
//! through an external gateway, and guarantees that:
//!
//! - no ticket type is ever oversold, even under concurrent buyers
//! - payment and ticket issuance are reconciled exactly once per order
//! - capacity freed by refunds is offered to a FIFO waiting list
//!
//! # Architecture
//!
//! ```text
//!  OrderIntake ──free──────────────────────────────▶ FulfillmentEngine ──▶ CascadeScheduler
//!      │                                                   ▲                     ▲
//!      └──paid──▶ gateway.initialize ─▶ buyer pays ─▶ gateway.verify             │
//!                                                                                │
//!  RefundProcessor ──▶ gateway.refund ──▶ restore inventory ─────────────────────┘
//!
//!  WaitingList::sweep_expired_offers (scheduled) ──────────────────────────────────┘
//! ```
//!
//! Every change to a ticket type's remaining quantity happens inside one
//! short store transaction holding row locks on the event's ticket types.
//! Gateway calls always complete before that transaction opens.
//!
//! # Usage
//!
//! See [`app::BoxOffice`] for wiring and `src/bin/demo.rs` for an end-to-end
//! sell-out, refund and waiting-list run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocation;
pub mod app;
pub mod cascade;
pub mod config;
pub mod environment;
pub mod fees;
pub mod fulfillment;
pub mod gateway;
pub mod intake;
pub mod metrics;
pub mod notifications;
pub mod payment_gateway;
pub mod refund;
pub mod store;
pub mod ticket_code;
pub mod waiting_list;

pub use app::{AppError, BoxOffice};
pub use config::Config;
pub use environment::EngineEnvironment;
pub use fulfillment::{FulfillmentEngine, FulfillmentOutcome, SelectionSource};
pub use intake::{IntakeOutcome, OrderIntake, OrderRequest, PaymentRedirect};
pub use refund::{RefundDecision, RefundProcessor};
pub use store::MemoryStore;
pub use waiting_list::{SweepReport, WaitingList};
