//! Refund processor.
//!
//! ```text
//! refund_status:  None ──initiate──▶ INITIATED ──approve──▶ PROCESSED
//!                   ▲                    │
//!                   └──────reject────────┘
//! ```
//!
//! On approval the gateway refund runs first, outside any transaction. Only
//! once money is confirmed returned does one transaction mark the order
//! `REFUNDED`, void its tickets and restore each ticket type's quantity.

use crate::cascade::CascadeScheduler;
use crate::environment::EngineEnvironment;
use crate::metrics;
use crate::notifications::notify_best_effort;
use boxoffice_core::error::{EngineError, Result};
use boxoffice_core::gateway::{PaymentGatewayError, RefundOutcome};
use boxoffice_core::notifier::Notification;
use boxoffice_core::types::{Caller, Order, OrderId, PaymentStatus, RefundStatus, TicketStatus, TicketTypeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// An approver's decision on an initiated refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundDecision {
    /// Return the money and restore inventory
    Approve,
    /// Clear the request; no monetary or inventory effect
    Reject,
}

/// Drives the refund state machine of completed orders.
#[derive(Debug, Clone)]
pub struct RefundProcessor {
    env: EngineEnvironment,
    cascade: CascadeScheduler,
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
}

/// Removes an order from the in-flight set when processing ends.
struct InFlight<'a> {
    orders: &'a Mutex<HashSet<OrderId>>,
    order_id: OrderId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

impl RefundProcessor {
    /// Creates a refund processor.
    #[must_use]
    pub fn new(env: EngineEnvironment, cascade: CascadeScheduler) -> Self {
        Self {
            env,
            cascade,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Request a refund of a completed order.
    ///
    /// Allowed for the order's buyer, the event's organizer and admins.
    ///
    /// # Errors
    ///
    /// - [`EngineError::OrderNotFound`]
    /// - [`EngineError::Unauthorized`]
    /// - [`EngineError::InvalidOrderState`] unless the order is `Completed`
    /// - [`EngineError::RefundNotAllowed`] if a refund was already requested
    #[tracing::instrument(skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn initiate(&self, caller: Caller, order_id: OrderId, reason: impl Into<String>) -> Result<Order> {
        let order = self.load(order_id).await?;
        self.authorize_initiation(caller, &order).await?;

        let mut tx = self.env.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;
        if order.payment_status != PaymentStatus::Completed {
            return Err(EngineError::InvalidOrderState {
                order_id,
                status: order.payment_status,
            });
        }
        if let Some(status) = order.refund_status {
            return Err(EngineError::RefundNotAllowed {
                order_id,
                reason: format!("refund already {status}"),
            });
        }

        order.refund_status = Some(RefundStatus::Initiated);
        order.refund_reason = Some(reason.into());
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, "Refund initiated");
        metrics::record_refund("initiated");
        notify_best_effort(self.env.notifier.as_ref(), Notification::refund_requested(&order)).await;
        Ok(order)
    }

    /// Approve or reject an initiated refund. Admin only.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Unauthorized`] unless `approver` is an admin
    /// - [`EngineError::OrderNotFound`]
    /// - [`EngineError::RefundNotAllowed`] if no refund is pending or one is already being processed
    /// - [`EngineError::RefundGatewayFailed`]; nothing changed locally
    #[tracing::instrument(skip(self), fields(approver_id = %approver.user_id))]
    pub async fn process(&self, approver: Caller, order_id: OrderId, decision: RefundDecision) -> Result<Order> {
        if !approver.is_admin() {
            return Err(EngineError::Unauthorized {
                user_id: approver.user_id,
                action: "process refunds",
            });
        }
        let _guard = self.claim(order_id)?;

        let order = self.load(order_id).await?;
        ensure_initiated(&order)?;

        match decision {
            RefundDecision::Reject => self.reject(order_id).await,
            RefundDecision::Approve => {
                self.return_money(&order).await?;
                self.restore(order_id).await
            }
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.env
            .store
            .order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))
    }

    async fn authorize_initiation(&self, caller: Caller, order: &Order) -> Result<()> {
        if caller.is_admin() || caller.user_id == order.buyer_id {
            return Ok(());
        }
        let organizer = self
            .env
            .store
            .event(order.event_id)
            .await?
            .map(|event| event.organizer_id);
        if organizer == Some(caller.user_id) {
            return Ok(());
        }
        Err(EngineError::Unauthorized {
            user_id: caller.user_id,
            action: "request a refund for this order",
        })
    }

    fn claim(&self, order_id: OrderId) -> Result<InFlight<'_>> {
        let mut orders = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !orders.insert(order_id) {
            return Err(EngineError::RefundNotAllowed {
                order_id,
                reason: "refund is already being processed".to_string(),
            });
        }
        Ok(InFlight {
            orders: &self.in_flight,
            order_id,
        })
    }

    async fn reject(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.env.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;
        ensure_initiated(&order)?;

        order.refund_status = None;
        order.refund_reason = None;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, "Refund rejected");
        metrics::record_refund("rejected");
        Ok(order)
    }

    /// Gateway refund for paid orders; free orders skip straight to restore.
    async fn return_money(&self, order: &Order) -> Result<()> {
        if !order.requires_payment() {
            return Ok(());
        }
        let transaction_reference = order
            .transaction_reference
            .as_deref()
            .unwrap_or(&order.payment_reference);

        let failure = match self.env.gateway.refund(transaction_reference, order.total_amount).await {
            Ok(receipt) if receipt.status == RefundOutcome::Success => {
                tracing::info!(
                    order_id = %order.id,
                    amount = order.total_amount.minor(),
                    refund_reference = ?receipt.refund_reference,
                    "Gateway refund succeeded"
                );
                return Ok(());
            }
            Ok(_) => "gateway refused the refund".to_string(),
            Err(PaymentGatewayError::Timeout) => "gateway timed out".to_string(),
            Err(error) => error.to_string(),
        };

        tracing::warn!(order_id = %order.id, reason = %failure, "Gateway refund failed; order unchanged");
        metrics::record_refund("gateway_failed");
        Err(EngineError::RefundGatewayFailed { reason: failure })
    }

    async fn restore(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.env.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound(order_id))?;
        if let Err(error) = ensure_initiated(&order) {
            tracing::error!(%order_id, %error, "Money returned but refund no longer pending; manual reconciliation needed");
            return Err(error);
        }

        let mut returned: BTreeMap<TicketTypeId, u32> = BTreeMap::new();
        for ticket in tx.tickets_for_order(order_id).await? {
            if ticket.status.holds_inventory() {
                *returned.entry(ticket.ticket_type_id).or_insert(0) += 1;
            }
        }
        for ticket_type in tx.lock_ticket_types(order.event_id).await? {
            if let Some(units) = returned.get(&ticket_type.id) {
                tx.set_ticket_type_quantity(ticket_type.id, ticket_type.quantity.saturating_add(*units))
                    .await?;
            }
        }
        tx.set_ticket_status_for_order(order_id, TicketStatus::Refunded).await?;

        order.payment_status = PaymentStatus::Refunded;
        order.refund_status = Some(RefundStatus::Processed);
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, restored = ?returned, "Refund processed; inventory restored");
        metrics::record_refund("processed");
        metrics::record_refunded_amount(order.total_amount.minor());

        notify_best_effort(self.env.notifier.as_ref(), Notification::refund_processed(&order)).await;
        self.cascade.run_best_effort(order.event_id).await;
        Ok(order)
    }
}

fn ensure_initiated(order: &Order) -> Result<()> {
    if order.refund_status == Some(RefundStatus::Initiated) && order.payment_status == PaymentStatus::Completed {
        return Ok(());
    }
    Err(EngineError::RefundNotAllowed {
        order_id: order.id,
        reason: match order.refund_status {
            Some(status) => format!("refund is {status}"),
            None => "no refund has been requested".to_string(),
        },
    })
}
