//! Mock payment gateway for development and demos.
//!
//! Simulates a hosted-checkout processor: `initialize` hands out a checkout
//! URL and remembers the charge, `verify` reports it settled in full, `refund`
//! always succeeds. In production, replace with a real processor integration
//! implementing [`PaymentGateway`].

use boxoffice_core::BoxFuture;
use boxoffice_core::gateway::{
    Authorization, ChargeStatus, GatewayResult, InitializeRequest, PaymentGateway, PaymentGatewayError,
    PaymentMetadata, RefundOutcome, RefundReceipt, Verification,
};
use boxoffice_core::types::Money;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Mock payment gateway (always succeeds for development)
#[derive(Clone, Debug)]
pub struct MockPaymentGateway {
    latency: Duration,
    charges: Arc<Mutex<HashMap<String, (Money, PaymentMetadata)>>>,
}

impl MockPaymentGateway {
    /// Creates a mock gateway with 100ms simulated latency.
    #[must_use]
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(100))
    }

    /// Creates a mock gateway with the given simulated latency.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            charges: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }

    fn charge(&self, reference: &str) -> Option<(Money, PaymentMetadata)> {
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn initialize(&self, request: InitializeRequest) -> BoxFuture<'_, GatewayResult<Authorization>> {
        Box::pin(async move {
            // Simulate network delay
            tokio::time::sleep(self.latency).await;

            self.charges
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(request.reference.clone(), (request.amount, request.metadata));

            tracing::info!(
                reference = %request.reference,
                amount = request.amount.minor(),
                "Mock charge initialized"
            );

            Ok(Authorization {
                authorization_url: format!("https://checkout.mock/pay/{}", request.reference),
                reference: request.reference,
            })
        })
    }

    fn verify(&self, reference: &str) -> BoxFuture<'_, GatewayResult<Verification>> {
        let reference = reference.to_string();
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let (amount, metadata) = self.charge(&reference).ok_or_else(|| {
                PaymentGatewayError::InvalidResponse {
                    message: format!("no charge for reference {reference}"),
                }
            })?;

            // Generate mock transaction ID
            let transaction_id = format!("mock_txn_{}", uuid::Uuid::new_v4());

            tracing::info!(
                reference = %reference,
                amount = amount.minor(),
                transaction_id = %transaction_id,
                "Mock payment verified"
            );

            Ok(Verification {
                reference,
                status: ChargeStatus::Success,
                paid_amount: amount,
                transaction_reference: Some(transaction_id),
                metadata: Some(metadata),
            })
        })
    }

    fn refund(&self, transaction_reference: &str, amount: Money) -> BoxFuture<'_, GatewayResult<RefundReceipt>> {
        let transaction_reference = transaction_reference.to_string();
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            // Generate mock refund ID
            let refund_id = format!("mock_refund_{}", uuid::Uuid::new_v4());

            tracing::info!(
                transaction_reference = %transaction_reference,
                amount = amount.minor(),
                refund_id = %refund_id,
                "Mock refund processed successfully"
            );

            Ok(RefundReceipt {
                status: RefundOutcome::Success,
                refund_reference: Some(refund_id),
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::types::{EventId, OrderId, UserId};

    #[tokio::test]
    async fn test_mock_charge_verifies_in_full() {
        let gateway = MockPaymentGateway::with_latency(Duration::ZERO);
        let request = InitializeRequest {
            amount: Money::from_minor(10_000),
            reference: "BOX-1".to_string(),
            callback_url: "http://localhost/callback".to_string(),
            metadata: PaymentMetadata {
                order_id: OrderId::new(),
                event_id: EventId::new(),
                buyer_id: UserId::new(),
                selections: vec![],
            },
        };

        let authorization = gateway.initialize(request).await.unwrap();
        assert!(authorization.authorization_url.ends_with("BOX-1"));

        let verification = gateway.verify("BOX-1").await.unwrap();
        assert_eq!(verification.status, ChargeStatus::Success);
        assert_eq!(verification.paid_amount, Money::from_minor(10_000));
        assert!(
            verification
                .transaction_reference
                .unwrap()
                .starts_with("mock_txn_")
        );
    }

    #[tokio::test]
    async fn test_mock_verify_unknown_reference() {
        let gateway = MockPaymentGateway::with_latency(Duration::ZERO);
        assert!(gateway.verify("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_refund_success() {
        let gateway = MockPaymentGateway::with_latency(Duration::ZERO);

        let receipt = gateway.refund("txn_123", Money::from_minor(100)).await.unwrap();

        assert_eq!(receipt.status, RefundOutcome::Success);
        assert!(receipt.refund_reference.unwrap().starts_with("mock_refund_"));
    }
}
