//! Ready-made domain records for tests.

use boxoffice_core::types::{
    Event, EventId, Money, PublishStatus, TicketType, TicketTypeId, UserId, WaitingListEntry,
    WaitingListEntryId, WaitingListStatus,
};
use chrono::{DateTime, Duration, Utc};

/// A published paid event starting 30 days after `now`.
#[must_use]
pub fn published_event(now: DateTime<Utc>) -> Event {
    Event {
        id: EventId::new(),
        organizer_id: UserId::new(),
        name: "Summer Music Festival".to_string(),
        is_free: false,
        start_date_time: now + Duration::days(30),
        status: PublishStatus::Published,
        attendee_limit: None,
    }
}

/// A published free event starting 30 days after `now`.
#[must_use]
pub fn free_event(now: DateTime<Utc>) -> Event {
    Event {
        is_free: true,
        name: "Community Meetup".to_string(),
        ..published_event(now)
    }
}

/// A ticket type for `event_id`.
#[must_use]
pub fn ticket_type(event_id: EventId, name: &str, price_minor: u64, quantity: u32) -> TicketType {
    TicketType {
        id: TicketTypeId::new(),
        event_id,
        name: name.to_string(),
        price: Money::from_minor(price_minor),
        quantity,
    }
}

/// A fresh `Waiting` entry.
#[must_use]
pub fn waiting_entry(event_id: EventId, user_id: UserId, created_at: DateTime<Utc>) -> WaitingListEntry {
    WaitingListEntry {
        id: WaitingListEntryId::new(),
        event_id,
        user_id,
        status: WaitingListStatus::Waiting,
        offer_expires_at: None,
        created_at,
    }
}
