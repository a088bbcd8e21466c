//! Payment gateway boundary.
//!
//! The gateway is an untrusted, possibly slow, possibly inconsistent remote
//! dependency. [`PaymentGateway::verify`] is the sole source of truth for
//! "was this actually paid". Amounts are integer minor units throughout.

use crate::BoxFuture;
use crate::types::{EventId, Money, OrderId, Selection, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// Gateway refused the request
    #[error("Gateway declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },
    /// Call exceeded the configured bound
    #[error("Gateway timeout")]
    Timeout,
    /// Transport or upstream outage
    #[error("Gateway unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
    /// Response could not be understood
    #[error("Invalid gateway response: {message}")]
    InvalidResponse {
        /// Error message
        message: String,
    },
}

/// Order context echoed back by the gateway on verification.
///
/// Used only as a secondary source of selections when the order's own copy is
/// missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    /// Order being paid
    pub order_id: OrderId,
    /// Event the order is for
    pub event_id: EventId,
    /// Paying user
    pub buyer_id: UserId,
    /// Requested lines at intake time
    pub selections: Vec<Selection>,
}

/// Charge initialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    /// Amount to charge
    pub amount: Money,
    /// Unique reference the charge is tied to
    pub reference: String,
    /// Where the gateway sends the buyer afterwards
    pub callback_url: String,
    /// Order context to echo back
    pub metadata: PaymentMetadata,
}

/// Result of a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// External page the buyer is redirected to
    pub authorization_url: String,
    /// Echo of the reference
    pub reference: String,
}

/// Charge status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Money captured
    Success,
    /// Still in progress at the gateway
    Pending,
    /// Buyer left without paying
    Abandoned,
    /// Charge declined
    Failed,
}

impl ChargeStatus {
    /// Whether the gateway will never report success for this charge.
    #[must_use]
    pub const fn is_definitive_failure(&self) -> bool {
        matches!(self, Self::Abandoned | Self::Failed)
    }
}

/// Verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Reference verified
    pub reference: String,
    /// Charge status
    pub status: ChargeStatus,
    /// Amount actually captured
    pub paid_amount: Money,
    /// Gateway-side transaction id (used for refunds)
    pub transaction_reference: Option<String>,
    /// Echoed order context, if the gateway kept it
    pub metadata: Option<PaymentMetadata>,
}

/// Refund status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOutcome {
    /// Money returned (or irrevocably queued for return)
    Success,
    /// Gateway refused the refund
    Failed,
}

/// Refund result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Outcome
    pub status: RefundOutcome,
    /// Gateway refund id
    pub refund_reference: Option<String>,
}

/// Payment gateway trait
///
/// Abstraction over remote payment processors.
///
/// # Dyn Compatibility
///
/// Returns boxed futures so the engine can hold an `Arc<dyn PaymentGateway>`.
pub trait PaymentGateway: Send + Sync {
    /// Start a charge and obtain the buyer's redirect URL.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway refuses or cannot be reached.
    fn initialize(&self, request: InitializeRequest) -> BoxFuture<'_, GatewayResult<Authorization>>;

    /// Ask the gateway what happened to the charge tied to `reference`.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be reached or answers nonsense.
    fn verify(&self, reference: &str) -> BoxFuture<'_, GatewayResult<Verification>>;

    /// Return `amount` against a previously captured transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be reached.
    fn refund(&self, transaction_reference: &str, amount: Money) -> BoxFuture<'_, GatewayResult<RefundReceipt>>;
}
