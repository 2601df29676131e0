//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use streambill_core::activation::ActivationService;
use streambill_core::billing::ErpClient;
use streambill_core::notify::MailNotifier;
use streambill_core::provisioning::OttClient;
use streambill_core::vault::CredentialVault;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;

/// The orchestrator wired to its production collaborators
pub type Activation =
    ActivationService<ErpClient, Arc<OttClient>, MailNotifier, Arc<CredentialVault>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt: JwtManager,
    pub vault: Arc<CredentialVault>,
    pub activation: Arc<Activation>,
    /// Direct provisioning handle for credential rotation
    pub provisioning: Arc<OttClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let vault = Arc::new(CredentialVault::new(pool.clone(), &config.vault)?);
        tracing::info!("Credential vault initialized");

        let billing = ErpClient::new(config.erp.clone());
        let notifier = MailNotifier::new(config.mailer.clone());
        let provisioning = Arc::new(OttClient::new(config.ott.clone()));

        let activation = Arc::new(ActivationService::new(
            billing,
            provisioning.clone(),
            notifier,
            vault.clone(),
            config.ott.customer_prefix.clone(),
        ));
        tracing::info!("Activation service initialized");

        Ok(Self {
            pool,
            config,
            jwt,
            vault,
            activation,
            provisioning,
        })
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
            pool: self.pool.clone(),
        }
    }
}
