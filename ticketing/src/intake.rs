//! Order intake and validation.
//!
//! Validates a buyer's selections against the event and an optimistic
//! inventory snapshot, prices the order, persists it `Pending` with its
//! selections, then either fulfills it on the spot (free) or starts a gateway
//! charge (paid). Inventory is only re-checked authoritatively at fulfillment.

use crate::allocation::demand;
use crate::environment::EngineEnvironment;
use crate::fulfillment::{FulfillmentEngine, FulfillmentOutcome};
use crate::metrics;
use boxoffice_core::error::{EngineError, Result};
use boxoffice_core::gateway::{InitializeRequest, PaymentGatewayError, PaymentMetadata};
use boxoffice_core::types::{
    Caller, Event, EventId, Money, Order, OrderId, PaymentStatus, Selection, TicketType, total_units,
};
use serde::{Deserialize, Serialize};

/// A buyer's request to purchase tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Event to buy for
    pub event_id: EventId,
    /// Requested lines, in the order tickets should be issued
    pub selections: Vec<Selection>,
    /// Optional buyer notes
    pub notes: Option<String>,
}

/// Where to send the buyer to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRedirect {
    /// The pending order
    pub order_id: OrderId,
    /// Reference the charge is tied to
    pub reference: String,
    /// Gateway checkout page
    pub authorization_url: String,
    /// Amount being charged
    pub total_amount: Money,
    /// Platform's share of it
    pub platform_fee: Money,
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Free order, fulfilled synchronously
    Completed(FulfillmentOutcome),
    /// Paid order, awaiting the buyer at the gateway
    AwaitingPayment(PaymentRedirect),
}

/// Entry point for new orders.
#[derive(Debug, Clone)]
pub struct OrderIntake {
    env: EngineEnvironment,
    fulfillment: FulfillmentEngine,
}

impl OrderIntake {
    /// Creates an intake bound to a fulfillment engine.
    #[must_use]
    pub fn new(env: EngineEnvironment, fulfillment: FulfillmentEngine) -> Self {
        Self { env, fulfillment }
    }

    /// Validate, price and persist an order, then fulfill it or start payment.
    ///
    /// # Errors
    ///
    /// - [`EngineError::EventNotFound`] / [`EngineError::EventUnavailable`]
    /// - [`EngineError::TicketTypeNotFound`], [`EngineError::InvalidQuantity`]
    /// - [`EngineError::InsufficientInventory`] (optimistic check)
    /// - [`EngineError::CapacityExceeded`] if the attendee limit would be passed
    /// - [`EngineError::AmountOverflow`]
    /// - [`EngineError::PaymentInitializationFailed`]; the pending order is deleted
    /// - any fulfillment error for free orders; the pending order is deleted
    #[tracing::instrument(skip(self, request), fields(buyer_id = %caller.user_id, event_id = %request.event_id))]
    pub async fn place_order(&self, caller: Caller, request: OrderRequest) -> Result<IntakeOutcome> {
        let result = self.validate_and_place(caller, request).await;
        if let Err(error) = &result {
            tracing::info!(%error, "Order rejected");
            metrics::record_order("rejected");
        }
        result
    }

    async fn validate_and_place(&self, caller: Caller, request: OrderRequest) -> Result<IntakeOutcome> {
        let event = self
            .env
            .store
            .event(request.event_id)
            .await?
            .ok_or(EngineError::EventNotFound(request.event_id))?;
        event
            .check_on_sale(self.env.clock.now())
            .map_err(|reason| EngineError::EventUnavailable {
                event_id: event.id,
                reason,
            })?;

        let ticket_types = self.env.store.ticket_types(event.id).await?;
        demand(&ticket_types, &request.selections)?;
        let quantity = total_units(&request.selections).ok_or(EngineError::AmountOverflow)?;
        self.check_capacity(&event, quantity).await?;

        let total_amount = if event.is_free {
            Money::ZERO
        } else {
            price(&ticket_types, &request.selections)?
        };
        let platform_fee = if total_amount.is_zero() {
            Money::ZERO
        } else {
            let rate = self.env.fees.fee_percentage(Some(event.organizer_id)).await;
            total_amount.percentage(rate)
        };

        let order = Order {
            id: OrderId::new(),
            event_id: event.id,
            buyer_id: caller.user_id,
            payment_reference: format!(
                "{}{}",
                self.env.settings.reference_prefix,
                uuid::Uuid::new_v4().simple()
            ),
            transaction_reference: None,
            total_amount,
            platform_fee,
            quantity,
            payment_status: PaymentStatus::Pending,
            refund_status: None,
            selections: request.selections,
            notes: request.notes,
            refund_reason: None,
            created_at: self.env.clock.now(),
            completed_at: None,
        };
        self.env.store.insert_order(&order).await?;
        metrics::record_order("placed");
        tracing::debug!(
            order_id = %order.id,
            quantity,
            total = total_amount.minor(),
            fee = platform_fee.minor(),
            "Pending order created"
        );

        if order.requires_payment() {
            self.start_payment(order).await.map(IntakeOutcome::AwaitingPayment)
        } else {
            match self.fulfillment.fulfill(order.id, None).await {
                Ok(outcome) => Ok(IntakeOutcome::Completed(outcome)),
                Err(error) => {
                    self.discard(order.id).await;
                    Err(error)
                }
            }
        }
    }

    async fn check_capacity(&self, event: &Event, requested: u32) -> Result<()> {
        let Some(limit) = event.attendee_limit else {
            return Ok(());
        };
        let issued = self.env.store.issued_ticket_count(event.id).await?;
        if u64::from(issued) + u64::from(requested) > u64::from(limit) {
            return Err(EngineError::CapacityExceeded {
                limit,
                issued,
                requested,
            });
        }
        Ok(())
    }

    async fn start_payment(&self, order: Order) -> Result<PaymentRedirect> {
        let request = InitializeRequest {
            amount: order.total_amount,
            reference: order.payment_reference.clone(),
            callback_url: self.env.settings.callback_url.clone(),
            metadata: PaymentMetadata {
                order_id: order.id,
                event_id: order.event_id,
                buyer_id: order.buyer_id,
                selections: order.selections.clone(),
            },
        };

        match self.env.gateway.initialize(request).await {
            Ok(authorization) => {
                metrics::record_order("awaiting_payment");
                tracing::info!(order_id = %order.id, reference = %order.payment_reference, "Payment initialized");
                Ok(PaymentRedirect {
                    order_id: order.id,
                    reference: order.payment_reference,
                    authorization_url: authorization.authorization_url,
                    total_amount: order.total_amount,
                    platform_fee: order.platform_fee,
                })
            }
            Err(error) => {
                tracing::warn!(order_id = %order.id, %error, "Payment initialization failed");
                self.discard(order.id).await;
                let reason = match error {
                    PaymentGatewayError::Timeout => "gateway timed out".to_string(),
                    other => other.to_string(),
                };
                Err(EngineError::PaymentInitializationFailed { reason })
            }
        }
    }

    /// Compensating delete of a pending order; failure is logged, not returned.
    async fn discard(&self, order_id: OrderId) {
        if let Err(error) = self.env.store.delete_order(order_id).await {
            tracing::warn!(%order_id, %error, "Could not delete abandoned pending order");
        }
    }
}

/// `Σ price × quantity`, checked.
fn price(ticket_types: &[TicketType], selections: &[Selection]) -> Result<Money> {
    selections.iter().try_fold(Money::ZERO, |total, selection| {
        let unit = ticket_types
            .iter()
            .find(|t| t.id == selection.ticket_type_id)
            .map_or(Money::ZERO, |t| t.price);
        unit.checked_multiply(selection.quantity)
            .and_then(|line| total.checked_add(line))
            .ok_or(EngineError::AmountOverflow)
    })
}
