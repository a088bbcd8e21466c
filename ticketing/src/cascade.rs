//! Waiting-list cascade scheduler.
//!
//! Offers freshly available capacity to queued users, first come first served.
//! An offer is a notification trigger, not an allocation: it reserves no
//! inventory, and the user still buys through normal order intake before
//! `offer_expires_at`.

use crate::environment::EngineEnvironment;
use crate::metrics;
use crate::notifications::notify_best_effort;
use boxoffice_core::EngineError;
use boxoffice_core::error::Result;
use boxoffice_core::notifier::Notification;
use boxoffice_core::types::{EventId, WaitingListEntry, WaitingListStatus};

/// Drains an event's waiting list into available capacity.
#[derive(Debug, Clone)]
pub struct CascadeScheduler {
    env: EngineEnvironment,
}

impl CascadeScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        Self { env }
    }

    /// Offer available units to the oldest `Waiting` entries of `event_id`.
    ///
    /// Offers `min(waiting entries, Σ remaining quantity)` entries; the rest
    /// stay `Waiting`. Returns the entries that were offered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the store fails, or
    /// [`EngineError::WaitingListConflict`] if the offer expiry cannot be
    /// represented. Nothing is offered in either case.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, event_id: EventId) -> Result<Vec<WaitingListEntry>> {
        let mut tx = self.env.store.begin().await?;

        let available: u64 = tx
            .lock_ticket_types(event_id)
            .await?
            .iter()
            .map(|t| u64::from(t.quantity))
            .sum();
        if available == 0 {
            return Ok(Vec::new());
        }

        let waiting: Vec<WaitingListEntry> = tx
            .lock_waiting_list(event_id)
            .await?
            .into_iter()
            .filter(|e| e.status == WaitingListStatus::Waiting)
            .collect();
        let offers = usize::try_from(available).map_or(waiting.len(), |units| units.min(waiting.len()));
        if offers == 0 {
            return Ok(Vec::new());
        }

        let expires_at = self
            .env
            .clock
            .now()
            .checked_add_signed(self.env.settings.offer_window)
            .ok_or_else(|| EngineError::WaitingListConflict {
                event_id,
                reason: "offer expiry out of range".to_string(),
            })?;
        let mut offered = Vec::with_capacity(offers);
        for mut entry in waiting.into_iter().take(offers) {
            entry.status = WaitingListStatus::Offered;
            entry.offer_expires_at = Some(expires_at);
            tx.save_waiting_entry(&entry).await?;
            offered.push(entry);
        }
        tx.commit().await?;

        tracing::info!(offered = offered.len(), available, %expires_at, "Waiting list offers made");
        metrics::record_waitlist_offers(offered.len());

        for entry in &offered {
            notify_best_effort(self.env.notifier.as_ref(), Notification::ticket_available(entry)).await;
        }

        Ok(offered)
    }

    /// Run the cascade, logging instead of returning a failure.
    ///
    /// Used after a committed fulfillment or refund, whose result must not
    /// depend on the cascade.
    pub async fn run_best_effort(&self, event_id: EventId) -> Vec<WaitingListEntry> {
        match self.run(event_id).await {
            Ok(offered) => offered,
            Err(error) => {
                tracing::warn!(%event_id, %error, "Waiting list cascade failed");
                Vec::new()
            }
        }
    }
}
