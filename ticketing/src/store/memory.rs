//! In-memory store for tests, demos and single-process deployments.
//!
//! The whole state sits behind one `tokio::sync::Mutex`. A transaction holds
//! the owned guard plus a working copy of the state; `commit` swaps the copy
//! in, and dropping the transaction discards it. Transactions are therefore
//! serialized, which trivially satisfies the row-lock contract of
//! [`StoreTransaction`].
//!
//! Never call a non-transactional [`OrderStore`] method while holding a
//! transaction on the same task: both need the mutex.

use async_trait::async_trait;
use boxoffice_core::error::{StoreError, StoreResult};
use boxoffice_core::store::{OrderStore, StoreTransaction};
use boxoffice_core::types::{
    Event, EventId, Order, OrderId, PaymentStatus, Ticket, TicketStatus, TicketType, TicketTypeId, WaitingListEntry,
    WaitingListStatus,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct State {
    events: HashMap<EventId, Event>,
    ticket_types: BTreeMap<TicketTypeId, TicketType>,
    orders: HashMap<OrderId, Order>,
    tickets: Vec<Ticket>,
    waiting_list: Vec<WaitingListEntry>,
}

impl State {
    fn ticket_types(&self, event_id: EventId) -> Vec<TicketType> {
        self.ticket_types
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect()
    }

    fn tickets_for_order(&self, order_id: OrderId) -> Vec<Ticket> {
        self.tickets
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect()
    }

    fn waiting_list(&self, event_id: EventId) -> Vec<WaitingListEntry> {
        let mut entries: Vec<WaitingListEntry> = self
            .waiting_list
            .iter()
            .filter(|e| e.event_id == event_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order.
        entries.sort_by_key(|e| e.created_at);
        entries
    }
}

/// In-memory [`OrderStore`].
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event with its ticket types.
    pub async fn add_event(&self, event: Event, ticket_types: Vec<TicketType>) {
        let mut state = self.state.lock().await;
        for ticket_type in ticket_types {
            state.ticket_types.insert(ticket_type.id, ticket_type);
        }
        state.events.insert(event.id, event);
    }

    /// Replace a stored event (e.g. to cancel it).
    pub async fn update_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    /// Look up one ticket type.
    pub async fn ticket_type(&self, ticket_type_id: TicketTypeId) -> Option<TicketType> {
        self.state.lock().await.ticket_types.get(&ticket_type_id).cloned()
    }

    /// Every order of an event, oldest first.
    pub async fn orders_for_event(&self, event_id: EventId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.event_id == event_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Every ticket issued for an event, across orders.
    pub async fn tickets_for_event(&self, event_id: EventId) -> Vec<Ticket> {
        self.state
            .lock()
            .await
            .tickets
            .iter()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn event(&self, event_id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn ticket_types(&self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        Ok(self.state.lock().await.ticket_types(event_id))
    }

    async fn issued_ticket_count(&self, event_id: EventId) -> StoreResult<u32> {
        let state = self.state.lock().await;
        let count = state
            .tickets
            .iter()
            .filter(|t| t.event_id == event_id && t.status.holds_inventory())
            .count();
        u32::try_from(count).map_err(|_| StoreError::Decode("issued ticket count exceeds u32".to_string()))
    }

    async fn order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn order_by_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.payment_reference == reference)
            .cloned())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        if state
            .orders
            .values()
            .any(|o| o.payment_reference == order.payment_reference)
        {
            return Err(StoreError::Conflict(format!(
                "payment reference {} already in use",
                order.payment_reference
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_order(&self, order_id: OrderId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .orders
            .get(&order_id)
            .is_some_and(|o| o.payment_status == PaymentStatus::Pending)
        {
            state.orders.remove(&order_id);
        }
        Ok(())
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        Ok(self.state.lock().await.tickets_for_order(order_id))
    }

    async fn waiting_list(&self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        Ok(self.state.lock().await.waiting_list(event_id))
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = State::clone(&guard);
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

/// Serialized unit of work over a [`MemoryStore`].
struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_order(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        match self.working.orders.get_mut(&order.id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(StoreError::Database(format!("order {} not found", order.id))),
        }
    }

    async fn lock_ticket_types(&mut self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        Ok(self.working.ticket_types(event_id))
    }

    async fn set_ticket_type_quantity(&mut self, ticket_type_id: TicketTypeId, quantity: u32) -> StoreResult<()> {
        match self.working.ticket_types.get_mut(&ticket_type_id) {
            Some(ticket_type) => {
                ticket_type.quantity = quantity;
                Ok(())
            }
            None => Err(StoreError::Database(format!("ticket type {ticket_type_id} not found"))),
        }
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()> {
        for ticket in tickets {
            if self
                .working
                .tickets
                .iter()
                .any(|t| t.ticket_code == ticket.ticket_code)
            {
                return Err(StoreError::Conflict(format!(
                    "ticket code {} already issued",
                    ticket.ticket_code
                )));
            }
            self.working.tickets.push(ticket.clone());
        }
        Ok(())
    }

    async fn tickets_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        Ok(self.working.tickets_for_order(order_id))
    }

    async fn set_ticket_status_for_order(&mut self, order_id: OrderId, status: TicketStatus) -> StoreResult<u64> {
        let mut changed = 0;
        for ticket in self
            .working
            .tickets
            .iter_mut()
            .filter(|t| t.order_id == order_id)
        {
            ticket.status = status;
            changed += 1;
        }
        Ok(changed)
    }

    async fn lock_waiting_list(&mut self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        Ok(self.working.waiting_list(event_id))
    }

    async fn lock_lapsed_offers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WaitingListEntry>> {
        Ok(self
            .working
            .waiting_list
            .iter()
            .filter(|e| {
                e.status == WaitingListStatus::Offered && e.offer_expires_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn save_waiting_entry(&mut self, entry: &WaitingListEntry) -> StoreResult<()> {
        match self.working.waiting_list.iter_mut().find(|e| e.id == entry.id) {
            Some(stored) => *stored = entry.clone(),
            None => self.working.waiting_list.push(entry.clone()),
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::types::{Money, PublishStatus, UserId};

    fn event() -> Event {
        Event {
            id: EventId::new(),
            organizer_id: UserId::new(),
            name: "Gig".to_string(),
            is_free: false,
            start_date_time: Utc::now() + chrono::Duration::days(7),
            status: PublishStatus::Published,
            attendee_limit: None,
        }
    }

    fn ticket_type(event_id: EventId, quantity: u32) -> TicketType {
        TicketType {
            id: TicketTypeId::new(),
            event_id,
            name: "GA".to_string(),
            price: Money::from_minor(1_000),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let event = event();
        let ga = ticket_type(event.id, 10);
        store.add_event(event.clone(), vec![ga.clone()]).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.set_ticket_type_quantity(ga.id, 3).await.unwrap();
        }
        assert_eq!(store.ticket_type(ga.id).await.unwrap().quantity, 10);

        let mut tx = store.begin().await.unwrap();
        tx.set_ticket_type_quantity(ga.id, 3).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.ticket_type(ga.id).await.unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_ticket_types_are_ordered_by_id() {
        let store = MemoryStore::new();
        let event = event();
        let types: Vec<TicketType> = (0..5).map(|_| ticket_type(event.id, 1)).collect();
        store.add_event(event.clone(), types).await;

        let loaded = store.ticket_types(event.id).await.unwrap();
        let ids: Vec<TicketTypeId> = loaded.iter().map(|t| t.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
