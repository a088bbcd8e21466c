//! Domain types for the fulfillment engine.
//!
//! Identifiers, value objects, the four persisted records (`TicketType`, `Order`,
//! `Ticket`, `WaitingListEntry`) and the read-mostly `Event` they hang off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::StoreError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a scheduled event
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket type (priced admission tier)
    TicketTypeId
);
uuid_id!(
    /// Unique identifier for an order
    OrderId
);
uuid_id!(
    /// Internal identifier for an issued ticket row
    TicketId
);
uuid_id!(
    /// Unique identifier for a user (buyer, organizer or admin)
    UserId
);
uuid_id!(
    /// Unique identifier for a waiting-list entry
    WaitingListEntryId
);

/// External-facing, human-readable ticket code (e.g. `TKT-7K3M-Q9XR`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketCode(String);

impl TicketCode {
    /// Wrap an already-generated code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Objects (minor units to avoid floating point errors)
// ============================================================================

/// Currency amount in integer minor units (cents, kobo, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Takes a basis-point share of this amount, rounding half up.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // bps <= 10_000 keeps the result <= self
    pub const fn percentage(self, bps: BasisPoints) -> Self {
        let scaled = self.0 as u128 * bps.value() as u128;
        Self(((scaled + 5_000) / 10_000) as u64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// A percentage expressed in basis points (1/100th of a percent), capped at 100%.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// Upper bound: 100%
    pub const MAX: u32 = 10_000;

    /// Creates a basis-point value, saturating at 100%.
    #[must_use]
    pub const fn new(bps: u32) -> Self {
        if bps > Self::MAX { Self(Self::MAX) } else { Self(bps) }
    }

    /// Creates a value from a whole percentage.
    #[must_use]
    pub const fn from_percent(percent: u32) -> Self {
        Self::new(percent.saturating_mul(100))
    }

    /// Raw basis points
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

// ============================================================================
// Status enums
// ============================================================================

macro_rules! status_codec {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Convert status to its persisted string representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parse status from its persisted string representation.
            ///
            /// # Errors
            ///
            /// Returns [`StoreError::Decode`] if the string doesn't match a known status.
            pub fn parse(s: &str) -> Result<Self, StoreError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(StoreError::Decode(format!(
                        concat!("Invalid ", stringify!($name), ": {}"),
                        s
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Publication state of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStatus {
    /// Not yet visible to buyers
    Draft,
    /// On sale
    Published,
    /// Called off by the organizer
    Cancelled,
}

status_codec!(PublishStatus {
    Draft => "DRAFT",
    Published => "PUBLISHED",
    Cancelled => "CANCELLED",
});

/// Payment lifecycle of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created, awaiting payment verification (or synchronous free fulfillment)
    Pending,
    /// Tickets issued, inventory decremented
    Completed,
    /// Gateway definitively declined the charge
    Failed,
    /// Money returned, inventory restored
    Refunded,
}

status_codec!(PaymentStatus {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Refunded => "REFUNDED",
});

/// Refund workflow state of an order. `None` on the order means no refund requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    /// Requested, awaiting a privileged decision
    Initiated,
    /// Approved and executed
    Processed,
    /// Declined by an approver (recorded by external tooling; rejection here clears the status)
    Rejected,
    /// Gateway refund failed (recorded by external tooling; the engine leaves state untouched)
    Failed,
}

status_codec!(RefundStatus {
    Initiated => "INITIATED",
    Processed => "PROCESSED",
    Rejected => "REJECTED",
    Failed => "FAILED",
});

/// Lifecycle of an individual ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Issued, not yet scanned
    Unused,
    /// Scanned at the door
    Used,
    /// Voided without refund
    Cancelled,
    /// Voided by a processed refund
    Refunded,
}

status_codec!(TicketStatus {
    Unused => "UNUSED",
    Used => "USED",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
});

impl TicketStatus {
    /// Whether the ticket still occupies a unit of inventory.
    #[must_use]
    pub const fn holds_inventory(&self) -> bool {
        matches!(self, Self::Unused | Self::Used)
    }
}

/// Lifecycle of a waiting-list entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingListStatus {
    /// Queued, not yet offered
    Waiting,
    /// Notified that capacity is available; offer expires at `offer_expires_at`
    Offered,
    /// Offer lapsed without a purchase
    Expired,
    /// Offer turned into a completed order
    Converted,
}

status_codec!(WaitingListStatus {
    Waiting => "WAITING",
    Offered => "OFFERED",
    Expired => "EXPIRED",
    Converted => "CONVERTED",
});

impl WaitingListStatus {
    /// Whether the entry still represents a live interest in the event.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Offered)
    }
}

// ============================================================================
// Caller identity
// ============================================================================

/// Role of the acting user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular ticket buyer
    Buyer,
    /// Event organizer
    Organizer,
    /// Platform administrator
    Admin,
}

/// Explicit caller identity passed into every engine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Acting user
    pub user_id: UserId,
    /// Acting user's role
    pub role: Role,
}

impl Caller {
    /// A buyer acting on their own behalf.
    #[must_use]
    pub const fn buyer(user_id: UserId) -> Self {
        Self { user_id, role: Role::Buyer }
    }

    /// An organizer.
    #[must_use]
    pub const fn organizer(user_id: UserId) -> Self {
        Self { user_id, role: Role::Organizer }
    }

    /// A platform administrator.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self { user_id, role: Role::Admin }
    }

    /// Whether this caller holds the privileged admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ============================================================================
// Records
// ============================================================================

/// Why an event is not accepting orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Still a draft
    NotPublished,
    /// Called off
    Cancelled,
    /// Start time already passed
    AlreadyStarted,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPublished => f.write_str("event is not published"),
            Self::Cancelled => f.write_str("event is cancelled"),
            Self::AlreadyStarted => f.write_str("event has already started"),
        }
    }
}

/// A scheduled event (read-mostly here; owned by the catalog).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Organizer (used for fee lookup and refund authorization)
    pub organizer_id: UserId,
    /// Display name
    pub name: String,
    /// Free events skip the payment round-trip
    pub is_free: bool,
    /// Scheduled start
    pub start_date_time: DateTime<Utc>,
    /// Publication state
    pub status: PublishStatus,
    /// Optional cap on issued tickets across all ticket types
    pub attendee_limit: Option<u32>,
}

impl Event {
    /// Checks whether the event accepts orders at `now`.
    ///
    /// # Errors
    ///
    /// Returns the reason the event is unavailable.
    pub fn check_on_sale(&self, now: DateTime<Utc>) -> Result<(), UnavailableReason> {
        match self.status {
            PublishStatus::Draft => Err(UnavailableReason::NotPublished),
            PublishStatus::Cancelled => Err(UnavailableReason::Cancelled),
            PublishStatus::Published if self.start_date_time <= now => {
                Err(UnavailableReason::AlreadyStarted)
            }
            PublishStatus::Published => Ok(()),
        }
    }
}

/// A priced tier of admission with its own remaining-quantity counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Ticket type identifier
    pub id: TicketTypeId,
    /// Owning event
    pub event_id: EventId,
    /// Display name
    pub name: String,
    /// Unit price in minor units
    pub price: Money,
    /// Remaining unsold units
    pub quantity: u32,
}

/// One requested line of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Requested ticket type
    pub ticket_type_id: TicketTypeId,
    /// Requested units
    pub quantity: u32,
}

impl Selection {
    /// Creates a selection.
    #[must_use]
    pub const fn new(ticket_type_id: TicketTypeId, quantity: u32) -> Self {
        Self { ticket_type_id, quantity }
    }
}

/// Sum of units across selections, `None` on overflow.
#[must_use]
pub fn total_units(selections: &[Selection]) -> Option<u32> {
    selections
        .iter()
        .try_fold(0u32, |acc, s| acc.checked_add(s.quantity))
}

/// A buyer's order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Event the tickets are for
    pub event_id: EventId,
    /// Purchasing user
    pub buyer_id: UserId,
    /// Unique reference the gateway charge is tied to
    pub payment_reference: String,
    /// Gateway-side transaction reference, learned at verification
    pub transaction_reference: Option<String>,
    /// Sum of price x quantity across selections
    pub total_amount: Money,
    /// Platform's share of `total_amount`
    pub platform_fee: Money,
    /// Total tickets requested
    pub quantity: u32,
    /// Payment lifecycle
    pub payment_status: PaymentStatus,
    /// Refund workflow (`None` = no refund requested)
    pub refund_status: Option<RefundStatus>,
    /// Requested lines, persisted verbatim
    pub selections: Vec<Selection>,
    /// Optional buyer notes
    pub notes: Option<String>,
    /// Reason given when a refund was initiated
    pub refund_reason: Option<String>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When fulfillment committed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether a gateway charge must be verified before fulfillment.
    #[must_use]
    pub const fn requires_payment(&self) -> bool {
        !self.total_amount.is_zero()
    }

    /// Whether fulfillment has already committed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

/// One admitted unit, created only by fulfillment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Row identifier
    pub id: TicketId,
    /// External-facing code
    pub ticket_code: TicketCode,
    /// Owning order
    pub order_id: OrderId,
    /// Event admitted to
    pub event_id: EventId,
    /// Admission tier
    pub ticket_type_id: TicketTypeId,
    /// Holder
    pub user_id: UserId,
    /// Lifecycle
    pub status: TicketStatus,
    /// Issue time
    pub purchased_at: DateTime<Utc>,
    /// Signed payload binding code, event and buyer (for QR rendering)
    pub payload: String,
}

/// A user queued for an event after sell-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    /// Entry identifier
    pub id: WaitingListEntryId,
    /// Event waited on
    pub event_id: EventId,
    /// Waiting user
    pub user_id: UserId,
    /// Lifecycle
    pub status: WaitingListStatus,
    /// Offer deadline while `Offered`
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// Queue position is creation order
    pub created_at: DateTime<Utc>,
}
