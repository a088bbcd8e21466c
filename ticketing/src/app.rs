//! Application wiring.
//!
//! [`BoxOffice`] assembles the engine components over one shared
//! [`EngineEnvironment`].

use crate::cascade::CascadeScheduler;
use crate::config::{Config, ConfigError};
use crate::environment::EngineEnvironment;
use crate::fees::ConfiguredFeeCalculator;
use crate::fulfillment::FulfillmentEngine;
use crate::intake::OrderIntake;
use crate::refund::RefundProcessor;
use crate::ticket_code::PayloadError;
use crate::waiting_list::WaitingList;
use boxoffice_core::StoreError;
use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_core::fees::FeeCalculator;
use boxoffice_core::gateway::PaymentGateway;
use boxoffice_core::notifier::Notifier;
use boxoffice_core::store::OrderStore;
use boxoffice_postgres::PostgresStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Store connection or migration failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ticket signing key rejected
    #[error("Signing key error: {0}")]
    Signing(#[from] PayloadError),

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The assembled fulfillment engine.
#[derive(Debug, Clone)]
pub struct BoxOffice {
    /// Order intake
    pub intake: OrderIntake,
    /// Fulfillment (payment callbacks)
    pub fulfillment: FulfillmentEngine,
    /// Refund processor
    pub refunds: RefundProcessor,
    /// Waiting list operations
    pub waiting_list: WaitingList,
    /// Cascade scheduler
    pub cascade: CascadeScheduler,
}

impl BoxOffice {
    /// Wire the engine over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signing`] if the ticket signing secret is rejected,
    /// or [`AppError::Config`] if a tunable is out of range.
    pub fn new(
        config: &Config,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        fees: Arc<dyn FeeCalculator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let env = EngineEnvironment::new(config, store, gateway, notifier, fees, clock)?;
        Ok(Self::from_environment(env))
    }

    /// Wire the engine over a prepared environment.
    #[must_use]
    pub fn from_environment(env: EngineEnvironment) -> Self {
        let cascade = CascadeScheduler::new(env.clone());
        let fulfillment = FulfillmentEngine::new(env.clone(), cascade.clone());
        Self {
            intake: OrderIntake::new(env.clone(), fulfillment.clone()),
            refunds: RefundProcessor::new(env.clone(), cascade.clone()),
            waiting_list: WaitingList::new(env, cascade.clone()),
            fulfillment,
            cascade,
        }
    }

    /// Connect to Postgres, run migrations and wire the engine with the
    /// system clock and configured fee rates.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable, a migration fails or
    /// the configuration is rejected.
    pub async fn connect(
        config: &Config,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        tracing::info!(max_connections = config.postgres.max_connections, "Connecting to PostgreSQL");
        let store = PostgresStore::connect(
            &config.postgres.url,
            config.postgres.max_connections,
            Duration::from_secs(config.postgres.connect_timeout),
        )
        .await?;

        tracing::info!("Running database migrations...");
        store.migrate().await?;
        tracing::info!("✓ Store initialized");

        Self::new(
            config,
            Arc::new(store),
            gateway,
            notifier,
            Arc::new(ConfiguredFeeCalculator::new(config.fees.default_rate())),
            Arc::new(SystemClock),
        )
    }
}
