//! Row decoding and column conversions.
//!
//! Postgres has no unsigned integers: quantities are stored as `INTEGER` and
//! amounts as `BIGINT`. Values that do not fit the domain type surface as
//! [`StoreError::Decode`]; values that do not fit the column surface as
//! [`StoreError::Conflict`] before any SQL runs.

use boxoffice_core::StoreError;
use boxoffice_core::error::StoreResult;
use boxoffice_core::types::{
    Event, EventId, Money, Order, OrderId, PaymentStatus, PublishStatus, RefundStatus, Selection,
    Ticket, TicketCode, TicketId, TicketStatus, TicketType, TicketTypeId, UserId, WaitingListEntry,
    WaitingListEntryId, WaitingListStatus,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row};

macro_rules! event_columns {
    () => {
        "id, organizer_id, name, is_free, start_date_time, status, attendee_limit"
    };
}

macro_rules! ticket_type_columns {
    () => {
        "id, event_id, name, price, quantity"
    };
}

macro_rules! order_columns {
    () => {
        "id, event_id, buyer_id, payment_reference, transaction_reference, total_amount, \
         platform_fee, quantity, payment_status, refund_status, selections, notes, \
         refund_reason, created_at, completed_at"
    };
}

macro_rules! ticket_columns {
    () => {
        "id, ticket_code, order_id, event_id, ticket_type_id, user_id, status, purchased_at, payload"
    };
}

macro_rules! waiting_entry_columns {
    () => {
        "id, event_id, user_id, status, offer_expires_at, created_at"
    };
}

pub(crate) use event_columns;
pub(crate) use order_columns;
pub(crate) use ticket_columns;
pub(crate) use ticket_type_columns;
pub(crate) use waiting_entry_columns;

/// Map a driver error, classifying constraint rejections as conflicts.
pub(crate) fn map_db(context: &str, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
            StoreError::Conflict(format!("{context}: {db}"))
        }
        _ => StoreError::Database(format!("{context}: {error}")),
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Decode(format!("column {column}: {e}")))
}

fn to_u32(column: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("column {column}: negative value {value}")))
}

fn to_money(column: &str, value: i64) -> StoreResult<Money> {
    u64::try_from(value)
        .map(Money::from_minor)
        .map_err(|_| StoreError::Decode(format!("column {column}: negative amount {value}")))
}

/// Convert a quantity for an `INTEGER` column.
pub(crate) fn quantity_param(quantity: u32) -> StoreResult<i32> {
    i32::try_from(quantity).map_err(|_| StoreError::Conflict(format!("quantity {quantity} exceeds column range")))
}

/// Convert an amount for a `BIGINT` column.
pub(crate) fn money_param(amount: Money) -> StoreResult<i64> {
    i64::try_from(amount.minor()).map_err(|_| StoreError::Conflict(format!("amount {amount} exceeds column range")))
}

pub(crate) fn event(row: &PgRow) -> StoreResult<Event> {
    let attendee_limit = get::<Option<i32>>(row, "attendee_limit")?
        .map(|limit| to_u32("attendee_limit", limit))
        .transpose()?;
    Ok(Event {
        id: EventId::from_uuid(get(row, "id")?),
        organizer_id: UserId::from_uuid(get(row, "organizer_id")?),
        name: get(row, "name")?,
        is_free: get(row, "is_free")?,
        start_date_time: get(row, "start_date_time")?,
        status: PublishStatus::parse(get(row, "status")?)?,
        attendee_limit,
    })
}

pub(crate) fn ticket_type(row: &PgRow) -> StoreResult<TicketType> {
    Ok(TicketType {
        id: TicketTypeId::from_uuid(get(row, "id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        name: get(row, "name")?,
        price: to_money("price", get(row, "price")?)?,
        quantity: to_u32("quantity", get(row, "quantity")?)?,
    })
}

pub(crate) fn order(row: &PgRow) -> StoreResult<Order> {
    let refund_status = get::<Option<&str>>(row, "refund_status")?
        .map(RefundStatus::parse)
        .transpose()?;
    let Json(selections) = get::<Json<Vec<Selection>>>(row, "selections")?;
    Ok(Order {
        id: OrderId::from_uuid(get(row, "id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        buyer_id: UserId::from_uuid(get(row, "buyer_id")?),
        payment_reference: get(row, "payment_reference")?,
        transaction_reference: get(row, "transaction_reference")?,
        total_amount: to_money("total_amount", get(row, "total_amount")?)?,
        platform_fee: to_money("platform_fee", get(row, "platform_fee")?)?,
        quantity: to_u32("quantity", get(row, "quantity")?)?,
        payment_status: PaymentStatus::parse(get(row, "payment_status")?)?,
        refund_status,
        selections,
        notes: get(row, "notes")?,
        refund_reason: get(row, "refund_reason")?,
        created_at: get(row, "created_at")?,
        completed_at: get(row, "completed_at")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> StoreResult<Ticket> {
    Ok(Ticket {
        id: TicketId::from_uuid(get(row, "id")?),
        ticket_code: TicketCode::new(get::<String>(row, "ticket_code")?),
        order_id: OrderId::from_uuid(get(row, "order_id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        ticket_type_id: TicketTypeId::from_uuid(get(row, "ticket_type_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        status: TicketStatus::parse(get(row, "status")?)?,
        purchased_at: get(row, "purchased_at")?,
        payload: get(row, "payload")?,
    })
}

pub(crate) fn waiting_entry(row: &PgRow) -> StoreResult<WaitingListEntry> {
    Ok(WaitingListEntry {
        id: WaitingListEntryId::from_uuid(get(row, "id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        status: WaitingListStatus::parse(get(row, "status")?)?,
        offer_expires_at: get(row, "offer_expires_at")?,
        created_at: get(row, "created_at")?,
    })
}

/// Decode every row with `decode`.
pub(crate) fn all<T>(rows: &[PgRow], decode: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(decode).collect()
}
