//! Notification and delivery collaborator.
//!
//! Fire-and-forget: the engine logs failures and never rolls back the
//! transaction that triggered a notification.

use crate::BoxFuture;
use crate::types::{EventId, Order, OrderId, Ticket, UserId, WaitingListEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of notification emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Order fulfilled
    TicketPurchased,
    /// Refund initiated
    RefundRequested,
    /// Refund executed
    RefundProcessed,
    /// Waiting-list offer made
    TicketAvailable,
}

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened
    pub kind: NotificationKind,
    /// Order concerned (absent for waiting-list offers)
    pub order_id: Option<OrderId>,
    /// Event concerned
    pub event_id: EventId,
    /// Recipient
    pub user_id: UserId,
    /// Offer deadline for `TicketAvailable`
    pub offer_expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    fn for_order(kind: NotificationKind, order: &Order) -> Self {
        Self {
            kind,
            order_id: Some(order.id),
            event_id: order.event_id,
            user_id: order.buyer_id,
            offer_expires_at: None,
        }
    }

    /// Order fulfilled.
    #[must_use]
    pub fn ticket_purchased(order: &Order) -> Self {
        Self::for_order(NotificationKind::TicketPurchased, order)
    }

    /// Refund initiated.
    #[must_use]
    pub fn refund_requested(order: &Order) -> Self {
        Self::for_order(NotificationKind::RefundRequested, order)
    }

    /// Refund executed.
    #[must_use]
    pub fn refund_processed(order: &Order) -> Self {
        Self::for_order(NotificationKind::RefundProcessed, order)
    }

    /// Waiting-list offer made.
    #[must_use]
    pub const fn ticket_available(entry: &WaitingListEntry) -> Self {
        Self {
            kind: NotificationKind::TicketAvailable,
            order_id: None,
            event_id: entry.event_id,
            user_id: entry.user_id,
            offer_expires_at: entry.offer_expires_at,
        }
    }
}

/// Notification delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Notification delivery failed: {message}")]
pub struct NotifyError {
    /// What went wrong
    pub message: String,
}

impl NotifyError {
    /// Creates an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Outbound notification and ticket delivery.
pub trait Notifier: Send + Sync {
    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails; callers log and continue.
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;

    /// Deliver issued tickets to the buyer (email, wallet pass, export).
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails; callers log and continue.
    fn deliver_tickets(&self, order: &Order, tickets: &[Ticket]) -> BoxFuture<'_, Result<(), NotifyError>>;
}
