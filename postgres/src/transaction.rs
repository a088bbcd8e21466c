//! Row-locking unit of work.

use crate::rows::{self, map_db, order_columns, ticket_columns, ticket_type_columns, waiting_entry_columns};
use async_trait::async_trait;
use boxoffice_core::error::StoreResult;
use boxoffice_core::store::StoreTransaction;
use boxoffice_core::types::{
    EventId, Order, OrderId, Ticket, TicketStatus, TicketType, TicketTypeId, WaitingListEntry,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

/// A database transaction. Dropping it without [`StoreTransaction::commit`] rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn lock_order(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
        sqlx::query(concat!("SELECT ", order_columns!(), " FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(*order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_db("Failed to lock order", e))?
            .as_ref()
            .map(rows::order)
            .transpose()
    }

    async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            "UPDATE orders SET transaction_reference = $2, payment_status = $3, refund_status = $4, \
             selections = $5, refund_reason = $6, completed_at = $7 WHERE id = $1",
        )
        .bind(*order.id.as_uuid())
        .bind(order.transaction_reference.as_deref())
        .bind(order.payment_status.as_str())
        .bind(order.refund_status.map(|s| s.as_str()))
        .bind(Json(&order.selections))
        .bind(order.refund_reason.as_deref())
        .bind(order.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db("Failed to update order", e))?;
        Ok(())
    }

    async fn lock_ticket_types(&mut self, event_id: EventId) -> StoreResult<Vec<TicketType>> {
        // Fixed lock order across transactions
        let found = sqlx::query(concat!(
            "SELECT ",
            ticket_type_columns!(),
            " FROM ticket_types WHERE event_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(*event_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_db("Failed to lock ticket types", e))?;
        rows::all(&found, rows::ticket_type)
    }

    async fn set_ticket_type_quantity(&mut self, ticket_type_id: TicketTypeId, quantity: u32) -> StoreResult<()> {
        sqlx::query("UPDATE ticket_types SET quantity = $2 WHERE id = $1")
            .bind(*ticket_type_id.as_uuid())
            .bind(rows::quantity_param(quantity)?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db("Failed to update ticket type quantity", e))?;
        Ok(())
    }

    async fn insert_tickets(&mut self, tickets: &[Ticket]) -> StoreResult<()> {
        for ticket in tickets {
            sqlx::query(concat!(
                "INSERT INTO tickets (",
                ticket_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(*ticket.id.as_uuid())
            .bind(ticket.ticket_code.as_str())
            .bind(*ticket.order_id.as_uuid())
            .bind(*ticket.event_id.as_uuid())
            .bind(*ticket.ticket_type_id.as_uuid())
            .bind(*ticket.user_id.as_uuid())
            .bind(ticket.status.as_str())
            .bind(ticket.purchased_at)
            .bind(&ticket.payload)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db("Failed to insert ticket", e))?;
        }
        Ok(())
    }

    async fn tickets_for_order(&mut self, order_id: OrderId) -> StoreResult<Vec<Ticket>> {
        let found = sqlx::query(concat!("SELECT ", ticket_columns!(), " FROM tickets WHERE order_id = $1 ORDER BY seq"))
            .bind(*order_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_db("Failed to load tickets", e))?;
        rows::all(&found, rows::ticket)
    }

    async fn set_ticket_status_for_order(&mut self, order_id: OrderId, status: TicketStatus) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE tickets SET status = $2 WHERE order_id = $1")
            .bind(*order_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db("Failed to update ticket status", e))?;
        Ok(result.rows_affected())
    }

    async fn lock_waiting_list(&mut self, event_id: EventId) -> StoreResult<Vec<WaitingListEntry>> {
        let found = sqlx::query(concat!(
            "SELECT ",
            waiting_entry_columns!(),
            " FROM waiting_list_entries WHERE event_id = $1 ORDER BY created_at, seq FOR UPDATE"
        ))
        .bind(*event_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_db("Failed to lock waiting list", e))?;
        rows::all(&found, rows::waiting_entry)
    }

    async fn lock_lapsed_offers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WaitingListEntry>> {
        let found = sqlx::query(concat!(
            "SELECT ",
            waiting_entry_columns!(),
            " FROM waiting_list_entries WHERE status = 'OFFERED' AND offer_expires_at <= $1 \
             ORDER BY created_at, seq FOR UPDATE"
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_db("Failed to lock lapsed offers", e))?;
        rows::all(&found, rows::waiting_entry)
    }

    async fn save_waiting_entry(&mut self, entry: &WaitingListEntry) -> StoreResult<()> {
        sqlx::query(concat!(
            "INSERT INTO waiting_list_entries (",
            waiting_entry_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, offer_expires_at = EXCLUDED.offer_expires_at"
        ))
        .bind(*entry.id.as_uuid())
        .bind(*entry.event_id.as_uuid())
        .bind(*entry.user_id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.offer_expires_at)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db("Failed to save waiting list entry", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_db("Failed to commit transaction", e))
    }
}
