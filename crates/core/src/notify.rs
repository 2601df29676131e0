//! Credential delivery
//!
//! After a successful first-time activation the customer gets their playback
//! login and password by email. Delivery failures never fail the activation;
//! the orchestrator downgrades them to warnings, so everything here surfaces
//! as [`CoreError::Notification`].

use async_trait::async_trait;
use serde_json::json;

use crate::config::MailerConfig;
use crate::error::{CoreError, CoreResult};

/// What the credential email needs to say
#[derive(Debug, Clone)]
pub struct CredentialNotice {
    pub to: String,
    pub first_name: String,
    pub login: String,
    pub password: String,
}

#[async_trait]
pub trait CredentialNotifier: Send + Sync {
    async fn send_credentials(&self, notice: &CredentialNotice) -> CoreResult<()>;
}

/// HTTP mail-API binding
pub struct MailNotifier {
    config: MailerConfig,
    http: reqwest::Client,
}

impl MailNotifier {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CredentialNotifier for MailNotifier {
    async fn send_credentials(&self, notice: &CredentialNotice) -> CoreResult<()> {
        let body = json!({
            "from": self.config.from_address,
            "to": [notice.to],
            "subject": "Tu cuenta está lista",
            "text": format!(
                "Hola {},\n\nTu suscripción fue activada.\n\nUsuario: {}\nContraseña: {}\n",
                notice.first_name, notice.login, notice.password
            ),
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Notification(format!(
                "mail api answered {}: {}",
                status, text
            )));
        }

        tracing::info!(to = %notice.to, "Sent credential email");
        Ok(())
    }
}
