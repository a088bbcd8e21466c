//! Business metrics for the fulfillment engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_orders_total{outcome}` - Orders by outcome (placed, awaiting_payment, completed, rejected)
//! - `boxoffice_tickets_issued_total` - Tickets issued by fulfillment
//! - `boxoffice_refunds_total{outcome}` - Refunds by outcome (initiated, processed, rejected, gateway_failed)
//! - `boxoffice_refunded_cents_total` - Money returned in minor units
//! - `boxoffice_fallback_distributions_total` - Fulfillments that had to synthesize selections
//! - `boxoffice_waitlist_offers_total` - Waiting-list offers made
//! - `boxoffice_waitlist_expired_total` - Offers reaped by the sweep
//!
//! ## Histograms
//! - `boxoffice_gateway_duration_seconds{op,result}` - Payment gateway call latency

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_orders_total",
        "Total number of orders by outcome (placed, awaiting_payment, completed, rejected)"
    );
    describe_counter!(
        "boxoffice_tickets_issued_total",
        "Total number of tickets issued"
    );
    describe_counter!(
        "boxoffice_refunds_total",
        "Total number of refund transitions by outcome"
    );
    describe_counter!(
        "boxoffice_refunded_cents_total",
        "Total money refunded in minor units"
    );
    describe_counter!(
        "boxoffice_fallback_distributions_total",
        "Fulfillments that synthesized a ticket-type distribution"
    );
    describe_counter!(
        "boxoffice_waitlist_offers_total",
        "Total waiting-list offers made"
    );
    describe_counter!(
        "boxoffice_waitlist_expired_total",
        "Total waiting-list offers expired by the sweep"
    );
    describe_histogram!(
        "boxoffice_gateway_duration_seconds",
        "Payment gateway call latency"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record an order outcome.
pub fn record_order(outcome: &'static str) {
    metrics::counter!("boxoffice_orders_total", "outcome" => outcome).increment(1);
}

/// Record a committed fulfillment.
pub fn record_tickets_issued(quantity: u32) {
    metrics::counter!("boxoffice_orders_total", "outcome" => "completed").increment(1);
    metrics::counter!("boxoffice_tickets_issued_total").increment(u64::from(quantity));
    tracing::debug!(quantity, "Recorded tickets_issued metric");
}

/// Record a refund transition.
pub fn record_refund(outcome: &'static str) {
    metrics::counter!("boxoffice_refunds_total", "outcome" => outcome).increment(1);
}

/// Record money returned by a processed refund.
pub fn record_refunded_amount(minor: u64) {
    metrics::counter!("boxoffice_refunded_cents_total").increment(minor);
}

/// Record a fallback distribution.
pub fn record_fallback_distribution() {
    metrics::counter!("boxoffice_fallback_distributions_total").increment(1);
}

/// Record waiting-list offers.
pub fn record_waitlist_offers(count: usize) {
    metrics::counter!("boxoffice_waitlist_offers_total").increment(count as u64);
}

/// Record reaped offers.
pub fn record_waitlist_expired(count: usize) {
    metrics::counter!("boxoffice_waitlist_expired_total").increment(count as u64);
}

/// Record a gateway call.
pub fn record_gateway_call(op: &'static str, elapsed: Duration, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::histogram!("boxoffice_gateway_duration_seconds", "op" => op, "result" => result)
        .record(elapsed.as_secs_f64());
}
