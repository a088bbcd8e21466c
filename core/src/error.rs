//! Error types for the fulfillment engine.
//!
//! [`EngineError`] is the only error callers see. Its variants are grouped by
//! [`ErrorCategory`] so a caller can tell "your request was invalid" apart from
//! "your money may be in limbo" without matching every variant.

use crate::types::{EventId, Money, OrderId, PaymentStatus, TicketTypeId, UnavailableReason, UserId};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller's fault; never retried automatically
    Validation,
    /// Inventory moved underneath the caller; re-fetch availability and retry the whole order
    InventoryConflict,
    /// Caller lacks the role or ownership the operation requires
    Authorization,
    /// Payment gateway failed or disagreed; money state must be reconciled
    ExternalDependency,
    /// Persistence layer failed
    Storage,
}

/// Every failure the engine reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════

    /// Event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Event is not accepting orders.
    #[error("Event {event_id} is unavailable: {reason}")]
    EventUnavailable {
        /// Event that was requested
        event_id: EventId,
        /// Why it is unavailable
        reason: UnavailableReason,
    },

    /// A selection references a ticket type outside the event.
    #[error("Ticket type {ticket_type_id} not found for this event")]
    TicketTypeNotFound {
        /// Unknown ticket type
        ticket_type_id: TicketTypeId,
    },

    /// A requested quantity is not positive, or the order has no selections.
    #[error("Invalid quantity {quantity} for ticket type {ticket_type_id:?}")]
    InvalidQuantity {
        /// Offending ticket type (`None` when the order itself is empty)
        ticket_type_id: Option<TicketTypeId>,
        /// Requested quantity
        quantity: u32,
    },

    /// Issued plus requested tickets would exceed the event's attendee limit.
    #[error("Attendee limit {limit} exceeded: {issued} issued, {requested} requested")]
    CapacityExceeded {
        /// Event attendee limit
        limit: u32,
        /// Tickets already issued
        issued: u32,
        /// Tickets requested by this order
        requested: u32,
    },

    /// Order totals overflowed the money representation.
    #[error("Order amount overflow")]
    AmountOverflow,

    /// Order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order is in a payment state that forbids the operation.
    #[error("Order {order_id} is {status}")]
    InvalidOrderState {
        /// Order
        order_id: OrderId,
        /// Its current payment status
        status: PaymentStatus,
    },

    /// Refund state machine forbids the transition.
    #[error("Refund not allowed for order {order_id}: {reason}")]
    RefundNotAllowed {
        /// Order
        order_id: OrderId,
        /// Why the transition is refused
        reason: String,
    },

    /// Waiting-list join/leave refused.
    #[error("Waiting list conflict for event {event_id}: {reason}")]
    WaitingListConflict {
        /// Event
        event_id: EventId,
        /// Why the request is refused
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Inventory Conflicts
    // ═══════════════════════════════════════════════════════════

    /// Requested more units than remain.
    #[error("Insufficient inventory for ticket type {ticket_type_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Ticket type short on units
        ticket_type_id: TicketTypeId,
        /// Units requested
        requested: u32,
        /// Units remaining
        available: u32,
    },

    /// Tickets about to be issued do not match the order's quantity.
    #[error("Ticket count mismatch: order expects {expected}, selections yield {actual}")]
    TicketCountMismatch {
        /// `order.quantity`
        expected: u32,
        /// Tickets the selections would create
        actual: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Authorization
    // ═══════════════════════════════════════════════════════════

    /// Caller may not perform the action.
    #[error("User {user_id} is not authorized to {action}")]
    Unauthorized {
        /// Acting user
        user_id: UserId,
        /// Attempted action
        action: &'static str,
    },

    // ═══════════════════════════════════════════════════════════
    // External Dependency Errors
    // ═══════════════════════════════════════════════════════════

    /// Gateway could not start a charge; the pending order was removed.
    #[error("Payment initialization failed: {reason}")]
    PaymentInitializationFailed {
        /// Gateway-side reason
        reason: String,
    },

    /// Gateway did not confirm the charge (declined, errored or timed out).
    #[error("Payment verification failed for {reference}: {reason}")]
    PaymentVerificationFailed {
        /// Payment reference checked
        reference: String,
        /// Gateway-side reason
        reason: String,
    },

    /// Gateway confirmed a charge for a different amount than quoted.
    #[error("Payment amount mismatch: expected {expected}, paid {paid}")]
    PaymentAmountMismatch {
        /// `order.total_amount`
        expected: Money,
        /// Amount the gateway reports
        paid: Money,
    },

    /// Gateway refused or failed the refund; no local state changed.
    #[error("Refund gateway failed: {reason}")]
    RefundGatewayFailed {
        /// Gateway-side reason
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Classify this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EventNotFound(_)
            | Self::EventUnavailable { .. }
            | Self::TicketTypeNotFound { .. }
            | Self::InvalidQuantity { .. }
            | Self::CapacityExceeded { .. }
            | Self::AmountOverflow
            | Self::OrderNotFound(_)
            | Self::InvalidOrderState { .. }
            | Self::RefundNotAllowed { .. }
            | Self::WaitingListConflict { .. } => ErrorCategory::Validation,
            Self::InsufficientInventory { .. } | Self::TicketCountMismatch { .. } => {
                ErrorCategory::InventoryConflict
            }
            Self::Unauthorized { .. } => ErrorCategory::Authorization,
            Self::PaymentInitializationFailed { .. }
            | Self::PaymentVerificationFailed { .. }
            | Self::PaymentAmountMismatch { .. }
            | Self::RefundGatewayFailed { .. } => ErrorCategory::ExternalDependency,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }
}

/// Errors reported by store backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, query or transaction failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A persisted value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A uniqueness or check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_separate_money_in_limbo_from_bad_input() {
        let mismatch = EngineError::PaymentAmountMismatch {
            expected: Money::from_minor(5_000),
            paid: Money::from_minor(4_999),
        };
        assert_eq!(mismatch.category(), ErrorCategory::ExternalDependency);

        let bad = EngineError::InvalidQuantity { ticket_type_id: None, quantity: 0 };
        assert_eq!(bad.category(), ErrorCategory::Validation);

        let storage: EngineError = StoreError::Database("gone".to_string()).into();
        assert_eq!(storage.category(), ErrorCategory::Storage);
    }
}
