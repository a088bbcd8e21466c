//! Persistence seam for orders, inventory, tickets and the waiting list.
//!
//! # Transactions
//!
//! Every mutation of `TicketType::quantity` runs through a [`StoreTransaction`].
//! A transaction is all-or-nothing: [`StoreTransaction::commit`] makes every
//! write visible at once, and dropping an uncommitted transaction discards them.
//!
//! `lock_*` methods return rows the caller may then rely on until commit:
//! implementations must prevent a concurrent transaction from modifying (or
//! locking) those rows in the meantime. The Postgres backend uses
//! `SELECT ... FOR UPDATE`; the in-memory backend serializes transactions.
//!
//! Ticket-type rows are always locked per event and in id order, so two
//! orders touching overlapping types cannot deadlock.
//!
//! # Implementations
//!
//! - `MemoryStore` (in the `ticketing` crate): single-process, tests and demos
//! - `PostgresStore` (in `boxoffice-postgres`): production

use crate::error::StoreResult;
use crate::types::{
    Event, EventId, Order, OrderId, Ticket, TicketStatus, TicketType, TicketTypeId, WaitingListEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Non-transactional reads plus order intake writes, and the transaction factory.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an event.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn event(&self, event_id: EventId) -> StoreResult<Option<Event>>;

    /// All ticket types of an event, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn ticket_types(&self, event_id: EventId) -> StoreResult<Vec<TicketType>>;

    /// Tickets of an event that still hold inventory (`Unused` or `Used`).
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn issued_ticket_count(&self, event_id: EventId) -> StoreResult<u32>;

    /// Load an order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn order(&self, order_id: OrderId) -> StoreResult<Option<Order>>;

    /// Find the order tied to a payment reference.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn order_by_reference(&self, reference: &str) -> StoreResult<Option<Order>>;

    /// Persist a new `Pending` order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the id or payment reference already exists.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    /// Remove an order that never reached the gateway (compensating action).
    ///
    /// Only `Pending` orders are removed; any other order is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn delete_order(&self, order_id: OrderId) -> StoreResult<()>;

    /// Tickets of an order in issue order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn tickets_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Ticket>>;

    /// Waiting-list entries of an event in queue (creation) order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn waiting_list(&self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>>;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot start a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// A short, all-or-nothing unit of work.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock and load an order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn lock_order(&mut self, order_id: OrderId) -> StoreResult<Option<Order>>;

    /// Overwrite an order's mutable fields.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

    /// Lock and load every ticket type of an event, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn lock_ticket_types(&mut self, event_id: EventId) -> StoreResult<Vec<TicketType>>;

    /// Set a locked ticket type's remaining quantity.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn set_ticket_type_quantity(&mut self, ticket_type_id: TicketTypeId, quantity: u32) -> StoreResult<()>;

    /// Insert freshly issued tickets.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a ticket code is already taken.
    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()>;

    /// Tickets of an order in issue order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn tickets_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Ticket>>;

    /// Set the status of every ticket of an order; returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn set_ticket_status_for_order(&mut self, order_id: OrderId, status: TicketStatus) -> StoreResult<u64>;

    /// Lock and load an event's waiting list in queue order.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn lock_waiting_list(&mut self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>>;

    /// Lock and load `Offered` entries whose offer lapsed at or before `now`, across all events.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn lock_lapsed_offers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WaitingListEntry>>;

    /// Insert or overwrite a waiting-list entry.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn save_waiting_entry(&mut self, entry: &WaitingListEntry) -> StoreResult<()>;

    /// Make every write visible atomically.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is applied in that case.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
