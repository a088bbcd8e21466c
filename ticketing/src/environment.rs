//! Dependencies shared by the engine components.

use crate::app::AppError;
use crate::config::{Config, ConfigError};
use crate::gateway::GuardedGateway;
use crate::ticket_code::{TicketCodeGenerator, TicketSigner};
use boxoffice_core::environment::Clock;
use boxoffice_core::fees::FeeCalculator;
use boxoffice_core::gateway::PaymentGateway;
use boxoffice_core::notifier::Notifier;
use boxoffice_core::store::OrderStore;
use std::sync::Arc;

/// Engine settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Prefix of generated payment references
    pub reference_prefix: String,
    /// Passed to the gateway on `initialize`
    pub callback_url: String,
    /// How long a waiting-list offer stays open
    pub offer_window: chrono::Duration,
}

impl EngineSettings {
    /// Extract engine settings from the application config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the offer window is out of range.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            reference_prefix: config.fulfillment.reference_prefix.clone(),
            callback_url: config.gateway.callback_url.clone(),
            offer_window: config.waiting_list.offer_window()?,
        })
    }
}

/// Collaborators injected into every engine component.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct EngineEnvironment {
    /// Orders, inventory, tickets and waiting list
    pub store: Arc<dyn OrderStore>,
    /// Time-bounded payment gateway
    pub gateway: GuardedGateway,
    /// Post-commit notifications and ticket delivery
    pub notifier: Arc<dyn Notifier>,
    /// Platform fee lookup
    pub fees: Arc<dyn FeeCalculator>,
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Ticket code generator
    pub codes: TicketCodeGenerator,
    /// Ticket payload signer
    pub signer: TicketSigner,
    /// Tunables
    pub settings: EngineSettings,
}

impl std::fmt::Debug for EngineEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEnvironment")
            .field("gateway", &self.gateway)
            .field("codes", &self.codes)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EngineEnvironment {
    /// Creates an environment from collaborators and configuration.
    ///
    /// # Errors
    ///
    /// - [`AppError::Signing`] if the ticket signing secret is rejected
    /// - [`AppError::Config`] if a tunable is out of range
    pub fn new(
        config: &Config,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        fees: Arc<dyn FeeCalculator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            store,
            gateway: GuardedGateway::new(gateway, config.gateway.timeout()),
            notifier,
            fees,
            clock,
            codes: TicketCodeGenerator::new(config.fulfillment.ticket_code_prefix.clone()),
            signer: TicketSigner::new(config.fulfillment.signing_secret.as_bytes())?,
            settings: EngineSettings::from_config(config)?,
        })
    }
}
