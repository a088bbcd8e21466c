//! # Boxoffice Testing
//!
//! Testing utilities for the fulfillment engine.
//!
//! This crate provides:
//! - [`mocks::FixedClock`]: deterministic, manually advanced time
//! - [`gateway::ScriptedPaymentGateway`]: a payment gateway whose answers tests control
//! - [`mocks::RecordingNotifier`]: captures notifications and deliveries
//! - [`mocks::FlatFeeCalculator`]: constant fee rate
//! - [`fixtures`]: ready-made events and ticket types
//! - [`store::ConflictingStore`]: injects ticket-insert conflicts into any store
//!
//! ## Example
//!
//! ```
//! use boxoffice_testing::{test_clock, mocks::RecordingNotifier};
//! use boxoffice_core::environment::Clock;
//!
//! let clock = test_clock();
//! assert_eq!(clock.now(), clock.now());
//! let notifier = RecordingNotifier::new();
//! assert!(notifier.notifications().is_empty());
//! ```

pub mod fixtures;
pub mod gateway;
pub mod mocks;
pub mod store;

pub use gateway::ScriptedPaymentGateway;
pub use mocks::{FixedClock, FlatFeeCalculator, RecordingNotifier, test_clock};
pub use store::ConflictingStore;

/// Install a test-friendly tracing subscriber (idempotent).
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
