//! Collaborator configuration
//!
//! One explicit config struct per remote collaborator, constructed once at
//! startup and passed into the client constructors. Orchestration code never
//! reads the process environment directly.

use crate::error::{CoreError, CoreResult};

fn require(name: &str) -> CoreResult<String> {
    std::env::var(name).map_err(|_| CoreError::Config(format!("{} not set", name)))
}

/// Connection settings for the billing/ERP backend (JSON-RPC)
#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl ErpConfig {
    pub fn from_env() -> CoreResult<Self> {
        Ok(Self {
            url: require("ERP_URL")?,
            database: require("ERP_DB")?,
            username: require("ERP_USERNAME")?,
            password: require("ERP_PASSWORD")?,
        })
    }
}

/// Connection settings for the OTT provisioning platform
#[derive(Debug, Clone)]
pub struct OttConfig {
    /// Base URL of the provider's customer API
    pub base_url: String,
    /// Prefix prepended to the local user id to form the remote customer id
    pub customer_prefix: String,
}

impl OttConfig {
    pub fn from_env() -> CoreResult<Self> {
        Ok(Self {
            base_url: require("OTT_BASE_URL")?,
            customer_prefix: require("OTT_CUSTOMER_PREFIX")?,
        })
    }
}

/// Symmetric key material for the credential vault
#[derive(Clone)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte AES-256-GCM key
    pub encryption_key: String,
}

impl VaultConfig {
    pub fn from_env() -> CoreResult<Self> {
        Ok(Self {
            encryption_key: require("VAULT_ENCRYPTION_KEY")?,
        })
    }
}

// Debug is manual so the key never lands in logs.
impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

/// Settings for the outbound credential mailer (HTTP mail API)
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_address: String,
}

impl MailerConfig {
    pub fn from_env() -> CoreResult<Self> {
        Ok(Self {
            api_url: require("MAIL_API_URL")?,
            api_key: require("MAIL_API_KEY")?,
            from_address: require("MAIL_FROM")?,
        })
    }
}
