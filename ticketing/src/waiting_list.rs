//! Waiting list: joining after a sell-out, leaving, and reaping lapsed offers.

use crate::cascade::CascadeScheduler;
use crate::environment::EngineEnvironment;
use crate::metrics;
use boxoffice_core::StoreError;
use boxoffice_core::error::{EngineError, Result};
use boxoffice_core::types::{Caller, EventId, WaitingListEntry, WaitingListEntryId, WaitingListStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Result of one sweep over lapsed offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Offers that lapsed and were marked `Expired`
    pub expired: Vec<WaitingListEntry>,
    /// Entries offered by the cascades that followed
    pub offered: Vec<WaitingListEntry>,
}

/// Waiting-list operations.
#[derive(Debug, Clone)]
pub struct WaitingList {
    env: EngineEnvironment,
    cascade: CascadeScheduler,
}

impl WaitingList {
    /// Creates the waiting-list service.
    #[must_use]
    pub fn new(env: EngineEnvironment, cascade: CascadeScheduler) -> Self {
        Self { env, cascade }
    }

    /// Queue `caller` for a sold-out event.
    ///
    /// # Errors
    ///
    /// - [`EngineError::EventNotFound`] / [`EngineError::EventUnavailable`]
    /// - [`EngineError::WaitingListConflict`] if tickets remain or the caller already holds a live entry
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn join(&self, caller: Caller, event_id: EventId) -> Result<WaitingListEntry> {
        let now = self.env.clock.now();
        let event = self
            .env
            .store
            .event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;
        event
            .check_on_sale(now)
            .map_err(|reason| EngineError::EventUnavailable { event_id, reason })?;

        let in_stock = self
            .env
            .store
            .ticket_types(event_id)
            .await?
            .iter()
            .any(|t| t.quantity > 0);
        let at_limit = match event.attendee_limit {
            Some(limit) => self.env.store.issued_ticket_count(event_id).await? >= limit,
            None => false,
        };
        if in_stock && !at_limit {
            return Err(EngineError::WaitingListConflict {
                event_id,
                reason: "tickets are still available".to_string(),
            });
        }

        let mut tx = self.env.store.begin().await?;
        let queued = tx
            .lock_waiting_list(event_id)
            .await?
            .into_iter()
            .any(|e| e.user_id == caller.user_id && e.status.is_live());
        if queued {
            return Err(EngineError::WaitingListConflict {
                event_id,
                reason: "already on the waiting list".to_string(),
            });
        }

        let entry = WaitingListEntry {
            id: WaitingListEntryId::new(),
            event_id,
            user_id: caller.user_id,
            status: WaitingListStatus::Waiting,
            offer_expires_at: None,
            created_at: now,
        };
        // An empty queue locks no rows; a concurrent join surfaces as a unique-index conflict
        let saved = match tx.save_waiting_entry(&entry).await {
            Ok(()) => tx.commit().await,
            Err(error) => Err(error),
        };
        if let Err(error) = saved {
            return Err(match error {
                StoreError::Conflict(reason) => {
                    tracing::debug!(%reason, "Concurrent join rejected by the store");
                    EngineError::WaitingListConflict {
                        event_id,
                        reason: "already on the waiting list".to_string(),
                    }
                }
                other => other.into(),
            });
        }

        tracing::info!(entry_id = %entry.id, "Joined waiting list");
        Ok(entry)
    }

    /// Withdraw `caller`'s live entry; it becomes `Expired`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WaitingListConflict`] if the caller holds no live entry.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn leave(&self, caller: Caller, event_id: EventId) -> Result<WaitingListEntry> {
        let mut tx = self.env.store.begin().await?;
        let mut entry = tx
            .lock_waiting_list(event_id)
            .await?
            .into_iter()
            .find(|e| e.user_id == caller.user_id && e.status.is_live())
            .ok_or_else(|| EngineError::WaitingListConflict {
                event_id,
                reason: "not on the waiting list".to_string(),
            })?;

        let was_offered = entry.status == WaitingListStatus::Offered;
        entry.status = WaitingListStatus::Expired;
        tx.save_waiting_entry(&entry).await?;
        tx.commit().await?;
        tracing::info!(entry_id = %entry.id, was_offered, "Left waiting list");

        Ok(entry)
    }

    /// Entries of an event in queue order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the store fails.
    pub async fn entries(&self, event_id: EventId) -> Result<Vec<WaitingListEntry>> {
        Ok(self.env.store.waiting_list(event_id).await?)
    }

    /// Scheduled job: expire offers lapsed at `now`, then re-run the cascade
    /// for every affected event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if expiring offers fails. Cascade
    /// failures are logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_offers(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut tx = self.env.store.begin().await?;
        let mut expired = tx.lock_lapsed_offers(now).await?;
        for entry in &mut expired {
            entry.status = WaitingListStatus::Expired;
            tx.save_waiting_entry(entry).await?;
        }
        tx.commit().await?;

        if expired.is_empty() {
            return Ok(SweepReport::default());
        }
        tracing::info!(expired = expired.len(), "Lapsed waiting list offers expired");
        metrics::record_waitlist_expired(expired.len());

        let events: BTreeSet<EventId> = expired.iter().map(|e| e.event_id).collect();
        let mut offered = Vec::new();
        for event_id in events {
            offered.extend(self.cascade.run_best_effort(event_id).await);
        }

        Ok(SweepReport { expired, offered })
    }
}
