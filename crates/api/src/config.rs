//! Server configuration
//!
//! All environment access happens here, once, at startup. Everything past
//! this point receives explicit config structs.

use streambill_core::config::{ErpConfig, MailerConfig, OttConfig, VaultConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub erp: ErpConfig,
    pub ott: OttConfig,
    pub vault: VaultConfig,
    pub mailer: MailerConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET not set"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            erp: ErpConfig::from_env()?,
            ott: OttConfig::from_env()?,
            vault: VaultConfig::from_env()?,
            mailer: MailerConfig::from_env()?,
        })
    }
}
