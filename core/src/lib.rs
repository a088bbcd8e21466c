//! # Boxoffice Core
//!
//! Domain model and seams for the order fulfillment & inventory allocation engine.
//!
//! This crate owns no behaviour beyond value-object arithmetic and state-machine
//! predicates. It provides:
//!
//! - **Domain types** ([`types`]): events, ticket types, orders, tickets, waiting-list entries
//! - **Error taxonomy** ([`error`]): validation, inventory conflict, external dependency, storage
//! - **Collaborator traits**: [`gateway::PaymentGateway`], [`notifier::Notifier`],
//!   [`fees::FeeCalculator`], [`environment::Clock`]
//! - **Persistence seam** ([`store`]): the store and transaction traits every backend implements
//!
//! ## Architecture Principles
//!
//! - Every mutation of `TicketType::quantity` happens inside a [`store::StoreTransaction`]
//! - External calls (payment gateway) complete before a transaction opens
//! - Caller identity is an explicit argument, never ambient state
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::types::{Money, BasisPoints};
//!
//! let subtotal = Money::from_minor(5_000);
//! let fee = subtotal.percentage(BasisPoints::new(500));
//! assert_eq!(fee, Money::from_minor(250));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod environment;
pub mod error;
pub mod fees;
pub mod gateway;
pub mod notifier;
pub mod store;
pub mod types;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use error::{EngineError, ErrorCategory, StoreError};
