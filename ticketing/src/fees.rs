//! Configured platform fee rates.

use boxoffice_core::BoxFuture;
use boxoffice_core::fees::FeeCalculator;
use boxoffice_core::types::{BasisPoints, UserId};
use std::collections::HashMap;

/// Platform default rate with per-organizer overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredFeeCalculator {
    default_rate: BasisPoints,
    overrides: HashMap<UserId, BasisPoints>,
}

impl ConfiguredFeeCalculator {
    /// Charge `default_rate` for everyone.
    #[must_use]
    pub fn new(default_rate: BasisPoints) -> Self {
        Self {
            default_rate,
            overrides: HashMap::new(),
        }
    }

    /// Charge `rate` on events run by `organizer_id`.
    #[must_use]
    pub fn with_override(mut self, organizer_id: UserId, rate: BasisPoints) -> Self {
        self.overrides.insert(organizer_id, rate);
        self
    }
}

impl FeeCalculator for ConfiguredFeeCalculator {
    fn fee_percentage(&self, organizer_id: Option<UserId>) -> BoxFuture<'_, BasisPoints> {
        let rate = organizer_id
            .and_then(|id| self.overrides.get(&id).copied())
            .unwrap_or(self.default_rate);
        Box::pin(async move { rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_override_wins_over_default() {
        let vip = UserId::new();
        let fees = ConfiguredFeeCalculator::new(BasisPoints::new(500)).with_override(vip, BasisPoints::new(250));

        assert_eq!(fees.fee_percentage(Some(vip)).await, BasisPoints::new(250));
        assert_eq!(fees.fee_percentage(Some(UserId::new())).await, BasisPoints::new(500));
        assert_eq!(fees.fee_percentage(None).await, BasisPoints::new(500));
    }
}
