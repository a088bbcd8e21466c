//! Fulfillment transaction engine.
//!
//! Turns a paid (or free) `Pending` order into tickets exactly once:
//!
//! ```text
//! 1. load order                     COMPLETED → return existing tickets (no-op)
//! 2. verify payment (paid orders)   outside any transaction, time-bounded
//! 3. BEGIN
//!      lock order                   re-check status (a concurrent call may have won)
//!      lock ticket types (id order) authoritative inventory check
//!      insert tickets, decrement quantities, mark COMPLETED, convert offer
//!    COMMIT
//! 4. notify, deliver, cascade       best-effort
//! ```
//!
//! Selections come from the order itself. Only if those are missing does the
//! engine fall back to selections echoed in gateway metadata, and only if
//! those are missing too does it synthesize a distribution (audited at
//! `error` level).

use crate::allocation::{demand, fallback_distribution};
use crate::cascade::CascadeScheduler;
use crate::environment::EngineEnvironment;
use crate::metrics;
use crate::notifications::{deliver_best_effort, notify_best_effort};
use boxoffice_core::StoreError;
use boxoffice_core::error::{EngineError, Result};
use boxoffice_core::gateway::{ChargeStatus, Verification};
use boxoffice_core::notifier::Notification;
use boxoffice_core::store::StoreTransaction;
use boxoffice_core::types::{
    Order, OrderId, PaymentStatus, Selection, Ticket, TicketId, TicketStatus, WaitingListStatus, total_units,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the selections realized by a fulfillment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Persisted on the order at intake (primary path)
    Stored,
    /// Echoed back by the payment gateway
    GatewayMetadata,
    /// Synthesized across stocked ticket types
    Fallback,
}

/// Result of a fulfillment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOutcome {
    /// The order, now `Completed`
    pub order: Order,
    /// Its tickets in issue order
    pub tickets: Vec<Ticket>,
    /// `true` if an earlier call already fulfilled the order
    pub already_completed: bool,
    /// Origin of the realized selections
    pub selection_source: SelectionSource,
}

/// Issues tickets for verified or free orders.
#[derive(Debug, Clone)]
pub struct FulfillmentEngine {
    env: EngineEnvironment,
    cascade: CascadeScheduler,
}

impl FulfillmentEngine {
    /// Creates a fulfillment engine.
    #[must_use]
    pub fn new(env: EngineEnvironment, cascade: CascadeScheduler) -> Self {
        Self { env, cascade }
    }

    /// Fulfill `order_id`.
    ///
    /// `payment_reference`, if given, must be the order's own reference.
    /// Calling this again for a completed order returns the same tickets and
    /// touches nothing.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OrderNotFound`]
    /// - [`EngineError::InvalidOrderState`] if the order failed or was refunded
    /// - [`EngineError::PaymentVerificationFailed`] if the gateway did not confirm the charge
    /// - [`EngineError::PaymentAmountMismatch`] if the captured amount differs from the total
    /// - [`EngineError::InsufficientInventory`] if a type sold out since intake
    /// - [`EngineError::TicketCountMismatch`] if the selections do not add up to the order
    #[tracing::instrument(skip(self))]
    pub async fn fulfill(&self, order_id: OrderId, payment_reference: Option<&str>) -> Result<FulfillmentOutcome> {
        let order = self
            .env
            .store
            .order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;

        if order.is_completed() {
            tracing::debug!("Order already fulfilled");
            let tickets = self.env.store.tickets_for_order(order_id).await?;
            return Ok(already_fulfilled(order, tickets));
        }
        ensure_pending(&order)?;

        let verification = if order.requires_payment() {
            Some(self.verify_payment(&order, payment_reference).await?)
        } else {
            None
        };

        let recovered = recover_selections(&order, verification.as_ref());
        match self.commit(order_id, recovered.clone(), verification.clone()).await {
            // Fresh codes are drawn on every attempt
            Err(EngineError::Storage(StoreError::Conflict(reason))) => {
                tracing::warn!(%order_id, %reason, "Ticket insert conflicted; retrying with new codes");
                self.commit(order_id, recovered, verification).await
            }
            result => result,
        }
    }

    /// Fulfill the order tied to a gateway payment reference (callback entry point).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PaymentVerificationFailed`] if no order carries
    /// `reference`, otherwise the errors of [`FulfillmentEngine::fulfill`].
    pub async fn fulfill_by_reference(&self, reference: &str) -> Result<FulfillmentOutcome> {
        let order = self
            .env
            .store
            .order_by_reference(reference)
            .await?
            .ok_or_else(|| EngineError::PaymentVerificationFailed {
                reference: reference.to_string(),
                reason: "no order carries this reference".to_string(),
            })?;
        self.fulfill(order.id, Some(reference)).await
    }

    async fn verify_payment(&self, order: &Order, payment_reference: Option<&str>) -> Result<Verification> {
        let reference = payment_reference.unwrap_or(&order.payment_reference);
        let failed = |reason: String| EngineError::PaymentVerificationFailed {
            reference: reference.to_string(),
            reason,
        };
        if reference != order.payment_reference {
            return Err(failed("reference does not belong to this order".to_string()));
        }

        let verification = match self.env.gateway.verify(reference).await {
            Ok(verification) => verification,
            Err(error) => {
                tracing::warn!(order_id = %order.id, reference, %error, "Payment not verified; order stays pending");
                return Err(failed(error.to_string()));
            }
        };

        if verification.status != ChargeStatus::Success {
            if verification.status.is_definitive_failure() {
                self.mark_failed(order.id).await?;
                metrics::record_order("payment_failed");
            }
            return Err(failed(format!("charge status is {:?}", verification.status)));
        }

        if verification.paid_amount != order.total_amount {
            tracing::error!(
                order_id = %order.id,
                reference,
                expected = order.total_amount.minor(),
                paid = verification.paid_amount.minor(),
                "Paid amount does not match order total; no tickets issued"
            );
            metrics::record_order("amount_mismatch");
            return Err(EngineError::PaymentAmountMismatch {
                expected: order.total_amount,
                paid: verification.paid_amount,
            });
        }

        Ok(verification)
    }

    async fn mark_failed(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.env.store.begin().await?;
        let Some(mut order) = tx.lock_order(order_id).await? else {
            return Ok(());
        };
        if order.payment_status == PaymentStatus::Pending {
            order.payment_status = PaymentStatus::Failed;
            tx.update_order(&order).await?;
            tx.commit().await?;
            tracing::warn!(%order_id, "Payment declined; order marked failed");
        }
        Ok(())
    }

    async fn commit(
        &self,
        order_id: OrderId,
        recovered: Option<(SelectionSource, Vec<Selection>)>,
        verification: Option<Verification>,
    ) -> Result<FulfillmentOutcome> {
        let mut tx = self.env.store.begin().await?;

        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;
        if order.is_completed() {
            // Lost the race to a concurrent fulfillment of the same order.
            let tickets = tx.tickets_for_order(order_id).await?;
            return Ok(already_fulfilled(order, tickets));
        }
        ensure_pending(&order)?;

        let ticket_types = tx.lock_ticket_types(order.event_id).await?;
        let (source, selections) = match recovered {
            Some(recovered) => recovered,
            None => {
                let synthesized = fallback_distribution(&ticket_types, order.quantity)?;
                tracing::error!(
                    order_id = %order.id,
                    event_id = %order.event_id,
                    quantity = order.quantity,
                    allocation = ?synthesized,
                    "AUDIT: order selections unrecoverable; fallback distribution applied"
                );
                metrics::record_fallback_distribution();
                (SelectionSource::Fallback, synthesized)
            }
        };

        let actual = total_units(&selections).unwrap_or(u32::MAX);
        if actual != order.quantity {
            return Err(EngineError::TicketCountMismatch {
                expected: order.quantity,
                actual,
            });
        }
        let lines = demand(&ticket_types, &selections)?;

        let now = self.env.clock.now();
        let tickets = self.issue_tickets(&order, &selections, now);

        for line in &lines {
            tx.set_ticket_type_quantity(line.ticket_type_id, line.remaining()).await?;
        }
        tx.insert_tickets(&tickets).await?;

        order.payment_status = PaymentStatus::Completed;
        order.completed_at = Some(now);
        order.selections = selections;
        if let Some(verification) = verification {
            order.transaction_reference = verification.transaction_reference.or(order.transaction_reference);
        }
        tx.update_order(&order).await?;
        convert_offer(tx.as_mut(), &order).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            event_id = %order.event_id,
            tickets = tickets.len(),
            source = ?source,
            "Order fulfilled"
        );
        metrics::record_tickets_issued(order.quantity);

        let notifier = self.env.notifier.as_ref();
        notify_best_effort(notifier, Notification::ticket_purchased(&order)).await;
        deliver_best_effort(notifier, &order, &tickets).await;
        self.cascade.run_best_effort(order.event_id).await;

        Ok(FulfillmentOutcome {
            order,
            tickets,
            already_completed: false,
            selection_source: source,
        })
    }

    /// One ticket per unit: selections in the order given, units in sequence.
    fn issue_tickets(&self, order: &Order, selections: &[Selection], now: DateTime<Utc>) -> Vec<Ticket> {
        let count = selections.iter().map(|s| s.quantity as usize).sum();
        let codes = self.env.codes.generate_batch(count);

        selections
            .iter()
            .flat_map(|s| std::iter::repeat_n(s.ticket_type_id, s.quantity as usize))
            .zip(codes)
            .map(|(ticket_type_id, ticket_code)| Ticket {
                id: TicketId::new(),
                payload: self.env.signer.sign(&ticket_code, order.event_id, order.buyer_id),
                ticket_code,
                order_id: order.id,
                event_id: order.event_id,
                ticket_type_id,
                user_id: order.buyer_id,
                status: TicketStatus::Unused,
                purchased_at: now,
            })
            .collect()
    }
}

fn ensure_pending(order: &Order) -> Result<()> {
    if order.payment_status == PaymentStatus::Pending {
        Ok(())
    } else {
        Err(EngineError::InvalidOrderState {
            order_id: order.id,
            status: order.payment_status,
        })
    }
}

fn already_fulfilled(order: Order, tickets: Vec<Ticket>) -> FulfillmentOutcome {
    FulfillmentOutcome {
        order,
        tickets,
        already_completed: true,
        selection_source: SelectionSource::Stored,
    }
}

fn recover_selections(order: &Order, verification: Option<&Verification>) -> Option<(SelectionSource, Vec<Selection>)> {
    if !order.selections.is_empty() {
        return Some((SelectionSource::Stored, order.selections.clone()));
    }

    let echoed = verification
        .and_then(|v| v.metadata.as_ref())
        .filter(|m| m.order_id == order.id && !m.selections.is_empty())?;
    tracing::warn!(order_id = %order.id, "Order has no stored selections; using gateway metadata");
    Some((SelectionSource::GatewayMetadata, echoed.selections.clone()))
}

/// Mark the buyer's open offer for the event as converted.
///
/// A `Waiting` entry keeps its place; only an offer is consumed by a purchase.
async fn convert_offer(tx: &mut dyn StoreTransaction, order: &Order) -> Result<()> {
    let entries = tx.lock_waiting_list(order.event_id).await?;
    for mut entry in entries
        .into_iter()
        .filter(|e| e.user_id == order.buyer_id && e.status == WaitingListStatus::Offered)
    {
        entry.status = WaitingListStatus::Converted;
        tx.save_waiting_entry(&entry).await?;
        tracing::debug!(entry_id = %entry.id, "Waiting list entry converted");
    }
    Ok(())
}
