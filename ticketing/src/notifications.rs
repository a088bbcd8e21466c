//! Post-commit side effects.
//!
//! Notifications and ticket delivery fail open: a failure is logged at
//! `warn` and never changes the outcome of the operation that triggered it.

use boxoffice_core::BoxFuture;
use boxoffice_core::notifier::{Notification, Notifier, NotifyError};
use boxoffice_core::types::{Order, Ticket};

/// Send `notification`, logging (not returning) any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let kind = notification.kind;
    let user_id = notification.user_id;
    if let Err(error) = notifier.notify(notification).await {
        tracing::warn!(?kind, %user_id, %error, "Notification failed");
    }
}

/// Deliver `tickets`, logging (not returning) any failure.
pub async fn deliver_best_effort(notifier: &dyn Notifier, order: &Order, tickets: &[Ticket]) {
    if let Err(error) = notifier.deliver_tickets(order, tickets).await {
        tracing::warn!(order_id = %order.id, tickets = tickets.len(), %error, "Ticket delivery failed");
    }
}

/// Notifier that writes to the log instead of sending anything.
///
/// Used by the demo binary and local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(
                kind = ?notification.kind,
                user_id = %notification.user_id,
                event_id = %notification.event_id,
                order_id = ?notification.order_id,
                offer_expires_at = ?notification.offer_expires_at,
                "📧 Notification"
            );
            Ok(())
        })
    }

    fn deliver_tickets(&self, order: &Order, tickets: &[Ticket]) -> BoxFuture<'_, Result<(), NotifyError>> {
        let order_id = order.id;
        let codes: Vec<String> = tickets.iter().map(|t| t.ticket_code.to_string()).collect();
        Box::pin(async move {
            tracing::info!(%order_id, ?codes, "🎟️  Tickets delivered");
            Ok(())
        })
    }
}
