//! Platform fee collaborator.

use crate::BoxFuture;
use crate::types::{BasisPoints, UserId};

/// Looks up the platform fee rate, possibly organizer-specific.
pub trait FeeCalculator: Send + Sync {
    /// Fee rate for orders on events run by `organizer_id`, or the platform default.
    fn fee_percentage(&self, organizer_id: Option<UserId>) -> BoxFuture<'_, BasisPoints>;
}
