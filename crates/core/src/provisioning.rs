//! OTT provisioning client
//!
//! Talks to the external playback platform that actually grants channel
//! access. The wire format is the provider's: camelCase JSON, string-typed
//! numbers, `dd/mm/YYYY` dates, and a three-part customer document
//! (customer / customerAccount / customerInfo) plus a subscribeService list.
//!
//! The trait is the seam the orchestrator depends on; [`OttClient`] is the
//! HTTP binding. Remote state is authoritative here: a customer can exist on
//! the platform with no local record and vice versa, so `get_customer`
//! returning `None` is a normal answer, not an error.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::ProvisionProfile;
use crate::config::OttConfig;
use crate::error::{CoreError, CoreResult};
use crate::expiration::REMOTE_DATE_FORMAT;

/// One entitlement row as the provider represents it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedService {
    pub effective_dt: String,
    /// Empty string = open-ended
    #[serde(default)]
    pub expire_dt: String,
    pub service_menu: ServiceMenuRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMenuRef {
    pub service_menu_id: String,
}

impl SubscribedService {
    /// Numeric service id, if the provider sent one
    pub fn service_id(&self) -> Option<u32> {
        self.service_menu.service_menu_id.trim().parse().ok()
    }
}

/// The provider's view of an existing customer, as returned by `get_customer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub subscribe_service: Vec<SubscribedService>,
}

/// Device/session limits section of the create payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSection {
    pub auto_prov_count_stationary: String,
    pub auto_provision_count: String,
    pub auto_provision_count_mobile: String,
    pub customer_id: String,
    pub favorites_enabled: String,
    pub first_name: String,
    pub has_vod: String,
    pub last_name: String,
    pub localization_id: String,
    pub pin: String,
    pub status: String,
    pub display_timeout: String,
    pub multicast_tunein: String,
    pub multicastenabled: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAccountSection {
    pub effective_dt: String,
    pub expire_dt: String,
    pub primary_audio_language: String,
    pub secondary_audio_language: String,
    pub primary_subtitle_language: String,
    pub secondary_subtitle_language: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfoSection {
    pub address1: String,
    pub address2: String,
    pub address3: String,
    pub city: String,
    pub eas_location_code: String,
    pub email: String,
    pub home_phone: String,
    pub mobile_phone: String,
    pub note: String,
    pub state: String,
    pub work_phone: String,
    pub zipcode: String,
}

/// Full payload for `create_customer`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerPayload {
    pub customer: CustomerSection,
    pub customer_account: CustomerAccountSection,
    pub customer_info: CustomerInfoSection,
    pub subscribe_service: Vec<SubscribedService>,
}

/// Partial payload for `update_customer` on renewal: only the allowance
/// counts and the replacement entitlement set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerPayload {
    pub customer: UpdateCustomerSection,
    pub subscribe_service: Vec<SubscribedService>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerSection {
    pub auto_prov_count_stationary: String,
    pub auto_provision_count_mobile: String,
}

/// Identity fields needed to fill the create payload
#[derive(Debug, Clone)]
pub struct CustomerIdentity {
    pub first_name: String,
    pub email: String,
    pub mobile: String,
}

fn wire_date(d: NaiveDate) -> String {
    d.format(REMOTE_DATE_FORMAT).to_string()
}

fn wire_services(profile: &ProvisionProfile) -> Vec<SubscribedService> {
    profile
        .entitlements
        .iter()
        .map(|e| SubscribedService {
            effective_dt: wire_date(e.effective),
            expire_dt: e.expiry.map(wire_date).unwrap_or_default(),
            service_menu: ServiceMenuRef {
                service_menu_id: e.service_id.to_string(),
            },
        })
        .collect()
}

impl CreateCustomerPayload {
    /// Assemble the full customer document for a first-time provisioning call
    pub fn build(
        customer_id: &str,
        identity: &CustomerIdentity,
        password: &str,
        profile: &ProvisionProfile,
        today: NaiveDate,
    ) -> Self {
        Self {
            customer: CustomerSection {
                auto_prov_count_stationary: profile.allowance.stationary.to_string(),
                auto_provision_count: "0".to_string(),
                auto_provision_count_mobile: profile.allowance.mobile.to_string(),
                customer_id: customer_id.to_string(),
                favorites_enabled: "Y".to_string(),
                first_name: identity.first_name.clone(),
                has_vod: "Y".to_string(),
                last_name: "streambill".to_string(),
                localization_id: "71".to_string(),
                pin: "1234".to_string(),
                status: "A".to_string(),
                display_timeout: "10".to_string(),
                multicast_tunein: "N".to_string(),
                multicastenabled: "N".to_string(),
            },
            customer_account: CustomerAccountSection {
                effective_dt: wire_date(today),
                expire_dt: String::new(),
                primary_audio_language: "spa".to_string(),
                secondary_audio_language: "eng".to_string(),
                primary_subtitle_language: "spa".to_string(),
                secondary_subtitle_language: "eng".to_string(),
                login: customer_id.to_string(),
                password: password.to_string(),
            },
            customer_info: CustomerInfoSection {
                address1: String::new(),
                address2: String::new(),
                address3: String::new(),
                city: "La Paz".to_string(),
                eas_location_code: String::new(),
                email: identity.email.clone(),
                home_phone: String::new(),
                mobile_phone: identity.mobile.clone(),
                note: String::new(),
                state: "La Paz".to_string(),
                work_phone: String::new(),
                zipcode: "0000".to_string(),
            },
            subscribe_service: wire_services(profile),
        }
    }
}

impl UpdateCustomerPayload {
    /// Assemble the renewal payload: replacement entitlements + allowances
    pub fn build(profile: &ProvisionProfile) -> Self {
        Self {
            customer: UpdateCustomerSection {
                auto_prov_count_stationary: profile.allowance.stationary.to_string(),
                auto_provision_count_mobile: profile.allowance.mobile.to_string(),
            },
            subscribe_service: wire_services(profile),
        }
    }
}

/// Acknowledgement body from mutating provider calls
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvisioningAck {
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Abstract provisioning collaborator consumed by the orchestrator
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Fetch the remote customer, `None` when the platform has no record
    async fn get_customer(&self, customer_id: &str) -> CoreResult<Option<CustomerRecord>>;

    async fn create_customer(&self, payload: &CreateCustomerPayload) -> CoreResult<ProvisioningAck>;

    async fn update_customer(
        &self,
        customer_id: &str,
        payload: &UpdateCustomerPayload,
    ) -> CoreResult<ProvisioningAck>;

    /// Drop all current entitlements; renewal re-grants the full set after
    async fn delete_entitlements(&self, customer_id: &str) -> CoreResult<ProvisioningAck>;

    /// Push a new playback password for an already-provisioned customer
    async fn update_password(&self, customer_id: &str, new_password: &str) -> CoreResult<ProvisioningAck>;
}

#[async_trait]
impl<T: ProvisioningClient> ProvisioningClient for std::sync::Arc<T> {
    async fn get_customer(&self, customer_id: &str) -> CoreResult<Option<CustomerRecord>> {
        (**self).get_customer(customer_id).await
    }

    async fn create_customer(&self, payload: &CreateCustomerPayload) -> CoreResult<ProvisioningAck> {
        (**self).create_customer(payload).await
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        payload: &UpdateCustomerPayload,
    ) -> CoreResult<ProvisioningAck> {
        (**self).update_customer(customer_id, payload).await
    }

    async fn delete_entitlements(&self, customer_id: &str) -> CoreResult<ProvisioningAck> {
        (**self).delete_entitlements(customer_id).await
    }

    async fn update_password(
        &self,
        customer_id: &str,
        new_password: &str,
    ) -> CoreResult<ProvisioningAck> {
        (**self).update_password(customer_id, new_password).await
    }
}

/// HTTP binding for the provider's customer API
pub struct OttClient {
    config: OttConfig,
    http: reqwest::Client,
}

impl OttClient {
    pub fn new(config: OttConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Deterministic remote customer id for a local user
    pub fn customer_id_for(&self, user_id: i64) -> String {
        format!("{}{}", self.config.customer_prefix, user_id)
    }

    async fn check(response: reqwest::Response, what: &str) -> CoreResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(CoreError::provisioning(format!(
            "{} failed with {}: {}",
            what, status, body
        )))
    }
}

#[async_trait]
impl ProvisioningClient for OttClient {
    async fn get_customer(&self, customer_id: &str) -> CoreResult<Option<CustomerRecord>> {
        let url = format!(
            "{}/customers/getCustomer/{}",
            self.config.base_url, customer_id
        );
        tracing::debug!(customer_id = %customer_id, "Looking up provisioning customer");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;

        // The provider answers 200 with a null `response` field for unknown
        // customers; only transport-level failures are errors here.
        let body: serde_json::Value = Self::check(response, "get_customer")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;

        if body.get("response").map(|v| v.is_null()).unwrap_or(false) {
            return Ok(None);
        }

        let record: CustomerRecord = serde_json::from_value(body)
            .map_err(|e| CoreError::provisioning(format!("malformed customer record: {}", e)))?;
        Ok(Some(record))
    }

    async fn create_customer(&self, payload: &CreateCustomerPayload) -> CoreResult<ProvisioningAck> {
        let url = format!("{}/customers/create", self.config.base_url);
        tracing::info!(customer_id = %payload.customer.customer_id, "Creating provisioning customer");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;
        Self::check(response, "create_customer")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        payload: &UpdateCustomerPayload,
    ) -> CoreResult<ProvisioningAck> {
        let url = format!("{}/customers/{}", self.config.base_url, customer_id);
        tracing::info!(customer_id = %customer_id, "Updating provisioning customer");

        let response = self
            .http
            .put(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;
        Self::check(response, "update_customer")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))
    }

    async fn delete_entitlements(&self, customer_id: &str) -> CoreResult<ProvisioningAck> {
        let url = format!(
            "{}/customers/deleteServices/{}",
            self.config.base_url, customer_id
        );
        tracing::info!(customer_id = %customer_id, "Deleting provisioning entitlements");

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;
        Self::check(response, "delete_entitlements")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))
    }

    async fn update_password(
        &self,
        customer_id: &str,
        new_password: &str,
    ) -> CoreResult<ProvisioningAck> {
        let url = format!("{}/customers/{}", self.config.base_url, customer_id);
        let payload = serde_json::json!({
            "customerAccount": { "password": new_password }
        });

        let response = self
            .http
            .put(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))?;
        Self::check(response, "update_password")
            .await?
            .json()
            .await
            .map_err(|e| CoreError::provisioning(e.to_string()))
    }
}
