//! Time-bounded access to the payment gateway.
//!
//! Every call goes through [`GuardedGateway`], which caps its latency and
//! records it. An expired call yields [`PaymentGatewayError::Timeout`]; the
//! engine treats that as "not verified", never as implicit success.

use crate::metrics;
use boxoffice_core::gateway::{
    Authorization, GatewayResult, InitializeRequest, PaymentGateway, PaymentGatewayError, RefundReceipt,
    Verification,
};
use boxoffice_core::types::Money;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Payment gateway wrapper enforcing a per-call timeout.
#[derive(Clone)]
pub struct GuardedGateway {
    inner: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl std::fmt::Debug for GuardedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GuardedGateway {
    /// Wraps `inner`, bounding each call by `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn PaymentGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis(), "Payment gateway call timed out");
                Err(PaymentGatewayError::Timeout)
            }
        };
        metrics::record_gateway_call(op, started.elapsed(), result.is_ok());
        result
    }

    /// Start a charge.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error, or `Timeout` if it did not answer in time.
    pub async fn initialize(&self, request: InitializeRequest) -> GatewayResult<Authorization> {
        self.bounded("initialize", self.inner.initialize(request)).await
    }

    /// Ask the gateway whether `reference` was paid.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error, or `Timeout` if it did not answer in time.
    pub async fn verify(&self, reference: &str) -> GatewayResult<Verification> {
        self.bounded("verify", self.inner.verify(reference)).await
    }

    /// Return `amount` on a settled transaction.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error, or `Timeout` if it did not answer in time.
    pub async fn refund(&self, transaction_reference: &str, amount: Money) -> GatewayResult<RefundReceipt> {
        self.bounded("refund", self.inner.refund(transaction_reference, amount))
            .await
    }
}
