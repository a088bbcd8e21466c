//! Store wrapper that injects write conflicts.

use async_trait::async_trait;
use boxoffice_core::StoreError;
use boxoffice_core::error::StoreResult;
use boxoffice_core::store::{OrderStore, StoreTransaction};
use boxoffice_core::types::{
    Event, EventId, Order, OrderId, Ticket, TicketStatus, TicketType, TicketTypeId, WaitingListEntry,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Delegates to an inner store, rejecting scripted writes with
/// [`StoreError::Conflict`] the way a violated unique index would.
#[derive(Clone)]
pub struct ConflictingStore {
    inner: Arc<dyn OrderStore>,
    conflicts: Arc<Conflicts>,
}

#[derive(Default)]
struct Conflicts {
    ticket_inserts: AtomicUsize,
    waiting_saves: AtomicUsize,
    injected: AtomicUsize,
}

impl Conflicts {
    fn take(&self, counter: &AtomicUsize) -> bool {
        let take = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if take {
            self.injected.fetch_add(1, Ordering::SeqCst);
        }
        take
    }
}

impl ConflictingStore {
    /// Wrap `inner`, failing the next `ticket_inserts` calls to `insert_tickets`.
    #[must_use]
    pub fn new(inner: Arc<dyn OrderStore>, ticket_inserts: usize) -> Self {
        let conflicts = Conflicts {
            ticket_inserts: AtomicUsize::new(ticket_inserts),
            ..Conflicts::default()
        };
        Self {
            inner,
            conflicts: Arc::new(conflicts),
        }
    }

    /// Also fail the next `saves` calls to `save_waiting_entry`.
    pub fn fail_waiting_entry_saves(&self, saves: usize) {
        self.conflicts.waiting_saves.store(saves, Ordering::SeqCst);
    }

    /// Conflicts raised so far.
    #[must_use]
    pub fn injected(&self) -> usize {
        self.conflicts.injected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for ConflictingStore {
    async fn event(&self, event_id: EventId) -> StoreResult<Option<Event>> {
        self.inner.event(event_id).await
    }

    async fn ticket_types(&self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        self.inner.ticket_types(event_id).await
    }

    async fn issued_ticket_count(&self, event_id: EventId) -> StoreResult<u32> {
        self.inner.issued_ticket_count(event_id).await
    }

    async fn order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.order(order_id).await
    }

    async fn order_by_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        self.inner.order_by_reference(reference).await
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.inner.insert_order(order).await
    }

    async fn delete_order(&self, order_id: OrderId) -> StoreResult<()> {
        self.inner.delete_order(order_id).await
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        self.inner.tickets_for_order(order_id).await
    }

    async fn waiting_list(&self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        self.inner.waiting_list(event_id).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(ConflictingTransaction {
            inner: self.inner.begin().await?,
            conflicts: Arc::clone(&self.conflicts),
        }))
    }
}

struct ConflictingTransaction {
    inner: Box<dyn StoreTransaction>,
    conflicts: Arc<Conflicts>,
}

#[async_trait]
impl StoreTransaction for ConflictingTransaction {
    async fn lock_order(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.inner.lock_order(order_id).await
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        self.inner.update_order(order).await
    }

    async fn lock_ticket_types(&mut self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        self.inner.lock_ticket_types(event_id).await
    }

    async fn set_ticket_type_quantity(&mut self, ticket_type_id: TicketTypeId, quantity: u32) -> StoreResult<()> {
        self.inner.set_ticket_type_quantity(ticket_type_id, quantity).await
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()> {
        if self.conflicts.take(&self.conflicts.ticket_inserts) {
            return Err(StoreError::Conflict("ticket code already issued".to_string()));
        }
        self.inner.insert_tickets(tickets).await
    }

    async fn tickets_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        self.inner.tickets_for_order(order_id).await
    }

    async fn set_ticket_status_for_order(&mut self, order_id: OrderId, status: TicketStatus) -> StoreResult<u64> {
        self.inner.set_ticket_status_for_order(order_id, status).await
    }

    async fn lock_waiting_list(&mut self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        self.inner.lock_waiting_list(event_id).await
    }

    async fn lock_lapsed_offers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WaitingListEntry>> {
        self.inner.lock_lapsed_offers(now).await
    }

    async fn save_waiting_entry(&mut self, entry: &WaitingListEntry) -> StoreResult<()> {
        if self.conflicts.take(&self.conflicts.waiting_saves) {
            return Err(StoreError::Conflict("live waiting list entry exists".to_string()));
        }
        self.inner.save_waiting_entry(entry).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}
