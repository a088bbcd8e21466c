//! `PostgreSQL` store for the box office fulfillment engine.
//!
//! Implements [`OrderStore`] and [`StoreTransaction`] from `boxoffice-core`
//! over a sqlx connection pool:
//!
//! - Row locks via `SELECT ... FOR UPDATE` (ticket types in id order)
//! - `CHECK (quantity >= 0)` as the last guard against overselling
//! - A partial unique index keeping one live waiting-list entry per buyer
//! - Embedded migrations (`migrations/`)
//!
//! # Example
//!
//! ```no_run
//! use boxoffice_postgres::PostgresStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::connect("postgres://localhost/boxoffice", 10, Duration::from_secs(5)).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod transaction;

pub use transaction::PostgresTransaction;

use async_trait::async_trait;
use boxoffice_core::StoreError;
use boxoffice_core::error::StoreResult;
use boxoffice_core::store::{OrderStore, StoreTransaction};
use boxoffice_core::types::{Event, EventId, Order, OrderId, Ticket, TicketType, WaitingListEntry};
use rows::{event_columns, map_db, order_columns, ticket_columns, ticket_type_columns, waiting_entry_columns};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::time::Duration;

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32, connect_timeout: Duration) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Insert an event. Events are owned by the catalogue; the engine only reads them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id exists.
    pub async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let attendee_limit = event.attendee_limit.map(rows::quantity_param).transpose()?;
        sqlx::query(concat!("INSERT INTO events (", event_columns!(), ") VALUES ($1, $2, $3, $4, $5, $6, $7)"))
            .bind(*event.id.as_uuid())
            .bind(*event.organizer_id.as_uuid())
            .bind(&event.name)
            .bind(event.is_free)
            .bind(event.start_date_time)
            .bind(event.status.as_str())
            .bind(attendee_limit)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db("Failed to insert event", e))?;
        Ok(())
    }

    /// Insert a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id exists or a value is out of range.
    pub async fn insert_ticket_type(&self, ticket_type: &TicketType) -> StoreResult<()> {
        sqlx::query(concat!("INSERT INTO ticket_types (", ticket_type_columns!(), ") VALUES ($1, $2, $3, $4, $5)"))
            .bind(*ticket_type.id.as_uuid())
            .bind(*ticket_type.event_id.as_uuid())
            .bind(&ticket_type.name)
            .bind(rows::money_param(ticket_type.price)?)
            .bind(rows::quantity_param(ticket_type.quantity)?)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db("Failed to insert ticket type", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn event(&self, event_id: EventId) -> StoreResult<Option<Event>> {
        sqlx::query(concat!("SELECT ", event_columns!(), " FROM events WHERE id = $1"))
            .bind(*event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db("Failed to load event", e))?
            .as_ref()
            .map(rows::event)
            .transpose()
    }

    async fn ticket_types(&self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        let found = sqlx::query(concat!(
            "SELECT ",
            ticket_type_columns!(),
            " FROM ticket_types WHERE event_id = $1 ORDER BY id"
        ))
        .bind(*event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db("Failed to load ticket types", e))?;
        rows::all(&found, rows::ticket_type)
    }

    async fn issued_ticket_count(&self, event_id: EventId) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND status IN ('UNUSED', 'USED')",
        )
        .bind(*event_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db("Failed to count tickets", e))?;
        u32::try_from(count).map_err(|_| StoreError::Decode(format!("ticket count {count} out of range")))
    }

    async fn order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        sqlx::query(concat!("SELECT ", order_columns!(), " FROM orders WHERE id = $1"))
            .bind(*order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db("Failed to load order", e))?
            .as_ref()
            .map(rows::order)
            .transpose()
    }

    async fn order_by_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        sqlx::query(concat!("SELECT ", order_columns!(), " FROM orders WHERE payment_reference = $1"))
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db("Failed to load order by reference", e))?
            .as_ref()
            .map(rows::order)
            .transpose()
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(concat!(
            "INSERT INTO orders (",
            order_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(*order.id.as_uuid())
        .bind(*order.event_id.as_uuid())
        .bind(*order.buyer_id.as_uuid())
        .bind(&order.payment_reference)
        .bind(order.transaction_reference.as_deref())
        .bind(rows::money_param(order.total_amount)?)
        .bind(rows::money_param(order.platform_fee)?)
        .bind(rows::quantity_param(order.quantity)?)
        .bind(order.payment_status.as_str())
        .bind(order.refund_status.map(|s| s.as_str()))
        .bind(Json(&order.selections))
        .bind(order.notes.as_deref())
        .bind(order.refund_reason.as_deref())
        .bind(order.created_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db("Failed to insert order", e))?;

        tracing::debug!(order_id = %order.id, "Order persisted");
        Ok(())
    }

    async fn delete_order(&self, order_id: OrderId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND payment_status = 'PENDING'")
            .bind(*order_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_db("Failed to delete order", e))?;

        tracing::debug!(%order_id, removed = result.rows_affected(), "Pending order discarded");
        Ok(())
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        let found = sqlx::query(concat!("SELECT ", ticket_columns!(), " FROM tickets WHERE order_id = $1 ORDER BY seq"))
            .bind(*order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db("Failed to load tickets", e))?;
        rows::all(&found, rows::ticket)
    }

    async fn waiting_list(&self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        let found = sqlx::query(concat!(
            "SELECT ",
            waiting_entry_columns!(),
            " FROM waiting_list_entries WHERE event_id = $1 ORDER BY created_at, seq"
        ))
        .bind(*event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db("Failed to load waiting list", e))?;
        rows::all(&found, rows::waiting_entry)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }
}
