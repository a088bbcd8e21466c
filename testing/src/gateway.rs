//! Scriptable payment gateway.
//!
//! By default every initialized charge verifies as paid in full. Tests override
//! individual references to simulate declines, short payments, lost metadata,
//! transport errors and slow responses.

use boxoffice_core::BoxFuture;
use boxoffice_core::gateway::{
    Authorization, ChargeStatus, GatewayResult, InitializeRequest, PaymentGateway, PaymentGatewayError,
    PaymentMetadata, RefundOutcome, RefundReceipt, Verification,
};
use boxoffice_core::types::Money;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Charge {
    amount: Money,
    metadata: PaymentMetadata,
}

#[derive(Debug, Default)]
struct GatewayState {
    charges: HashMap<String, Charge>,
    scripted: HashMap<String, GatewayResult<Verification>>,
    fail_initialize: Option<PaymentGatewayError>,
    refund_result: Option<GatewayResult<RefundOutcome>>,
    drop_metadata: bool,
    verify_delay: Option<Duration>,
    initialize_calls: usize,
    verify_calls: usize,
    refunds: Vec<(String, Money)>,
}

/// Payment gateway whose answers are controlled by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedPaymentGateway {
    /// Gateway that accepts and settles every charge in full.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every `initialize` call fail with `error`.
    pub fn fail_initialize(&self, error: PaymentGatewayError) {
        self.state().fail_initialize = Some(error);
    }

    /// Report `paid` as the captured amount for `reference`.
    pub fn pay_amount(&self, reference: &str, paid: Money) {
        let mut state = self.state();
        let metadata = state.charges.get(reference).map(|c| c.metadata.clone());
        state.scripted.insert(
            reference.to_string(),
            Ok(Verification {
                reference: reference.to_string(),
                status: ChargeStatus::Success,
                paid_amount: paid,
                transaction_reference: Some(format!("txn_{reference}")),
                metadata,
            }),
        );
    }

    /// Report `status` (with nothing captured) for `reference`.
    pub fn set_status(&self, reference: &str, status: ChargeStatus) {
        self.state().scripted.insert(
            reference.to_string(),
            Ok(Verification {
                reference: reference.to_string(),
                status,
                paid_amount: Money::ZERO,
                transaction_reference: None,
                metadata: None,
            }),
        );
    }

    /// Fail `verify` for `reference` with a transport-level error.
    pub fn fail_verify(&self, reference: &str, error: PaymentGatewayError) {
        self.state().scripted.insert(reference.to_string(), Err(error));
    }

    /// Stop echoing order metadata on verification.
    pub fn drop_metadata(&self) {
        self.state().drop_metadata = true;
    }

    /// Delay every `verify` response.
    pub fn delay_verify(&self, delay: Duration) {
        self.state().verify_delay = Some(delay);
    }

    /// Answer every `refund` with `result`.
    pub fn set_refund_result(&self, result: GatewayResult<RefundOutcome>) {
        self.state().refund_result = Some(result);
    }

    /// Number of `initialize` calls.
    #[must_use]
    pub fn initialize_calls(&self) -> usize {
        self.state().initialize_calls
    }

    /// Number of `verify` calls.
    #[must_use]
    pub fn verify_calls(&self) -> usize {
        self.state().verify_calls
    }

    /// `(transaction reference, amount)` of every refund attempted.
    #[must_use]
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.state().refunds.clone()
    }

    /// Total gateway calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        let state = self.state();
        state.initialize_calls + state.verify_calls + state.refunds.len()
    }

    /// Amount the charge for `reference` was initialized with.
    #[must_use]
    pub fn charged_amount(&self, reference: &str) -> Option<Money> {
        self.state().charges.get(reference).map(|c| c.amount)
    }
}

impl PaymentGateway for ScriptedPaymentGateway {
    fn initialize(&self, request: InitializeRequest) -> BoxFuture<'_, GatewayResult<Authorization>> {
        let result = {
            let mut state = self.state();
            state.initialize_calls += 1;
            if let Some(error) = state.fail_initialize.clone() {
                Err(error)
            } else {
                state.charges.insert(
                    request.reference.clone(),
                    Charge {
                        amount: request.amount,
                        metadata: request.metadata,
                    },
                );
                Ok(Authorization {
                    authorization_url: format!("https://checkout.test/{}", request.reference),
                    reference: request.reference,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn verify(&self, reference: &str) -> BoxFuture<'_, GatewayResult<Verification>> {
        let (delay, result) = {
            let mut state = self.state();
            state.verify_calls += 1;
            let result = match state.scripted.get(reference) {
                Some(scripted) => scripted.clone(),
                None => match state.charges.get(reference) {
                    Some(charge) => Ok(Verification {
                        reference: reference.to_string(),
                        status: ChargeStatus::Success,
                        paid_amount: charge.amount,
                        transaction_reference: Some(format!("txn_{reference}")),
                        metadata: Some(charge.metadata.clone()),
                    }),
                    None => Err(PaymentGatewayError::InvalidResponse {
                        message: format!("unknown reference {reference}"),
                    }),
                },
            };
            let result = if state.drop_metadata {
                result.map(|v| Verification { metadata: None, ..v })
            } else {
                result
            };
            (state.verify_delay, result)
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn refund(&self, transaction_reference: &str, amount: Money) -> BoxFuture<'_, GatewayResult<RefundReceipt>> {
        let result = {
            let mut state = self.state();
            state.refunds.push((transaction_reference.to_string(), amount));
            state
                .refund_result
                .clone()
                .unwrap_or(Ok(RefundOutcome::Success))
                .map(|status| RefundReceipt {
                    status,
                    refund_reference: Some(format!("rfnd_{transaction_reference}")),
                })
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::types::{EventId, OrderId, UserId};

    fn request(reference: &str, amount: u64) -> InitializeRequest {
        InitializeRequest {
            amount: Money::from_minor(amount),
            reference: reference.to_string(),
            callback_url: "http://localhost/callback".to_string(),
            metadata: PaymentMetadata {
                order_id: OrderId::new(),
                event_id: EventId::new(),
                buyer_id: UserId::new(),
                selections: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_initialized_charge_verifies_in_full() {
        let gateway = ScriptedPaymentGateway::new();
        gateway.initialize(request("ref-1", 5_000)).await.unwrap();

        let verification = gateway.verify("ref-1").await.unwrap();
        assert_eq!(verification.status, ChargeStatus::Success);
        assert_eq!(verification.paid_amount, Money::from_minor(5_000));
        assert!(verification.metadata.is_some());
    }

    #[tokio::test]
    async fn test_scripted_short_payment() {
        let gateway = ScriptedPaymentGateway::new();
        gateway.initialize(request("ref-2", 5_000)).await.unwrap();
        gateway.pay_amount("ref-2", Money::from_minor(4_999));

        let verification = gateway.verify("ref-2").await.unwrap();
        assert_eq!(verification.paid_amount, Money::from_minor(4_999));
    }

    #[tokio::test]
    async fn test_unknown_reference_is_an_error() {
        let gateway = ScriptedPaymentGateway::new();
        assert!(gateway.verify("nope").await.is_err());
        assert_eq!(gateway.verify_calls(), 1);
    }
}
