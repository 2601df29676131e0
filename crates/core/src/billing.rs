//! Billing/ERP client
//!
//! The billing backend owns contacts, plans (products), invoices and
//! payments. The orchestrator consumes the [`BillingClient`] trait;
//! [`ErpClient`] binds it to the ERP's JSON-RPC endpoint (`execute_kw` over
//! the object service). Each call authenticates lazily and runs in its own
//! request scope; there is no session pooling and no multi-call transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::config::ErpConfig;
use crate::error::{CoreError, CoreResult};
use crate::requests::PaymentMethod;

/// ERP currency record id for bolivianos, stamped on every invoice
const BOB_CURRENCY_ID: i64 = 63;

/// Billing-system contact (partner) record. The orchestrator reads it and
/// writes identity fields only, never financial fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
}

/// Document-identity fields written to the contact and stamped onto invoices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFields {
    /// Identification type id (`"1"` = national id card, which is the only
    /// type that carries an extension)
    pub document_type: String,
    pub document_number: String,
    #[serde(default)]
    pub extension: String,
    pub legal_name: String,
}

/// How the customer settled, stamped onto the invoice alongside the
/// identity fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementDetails {
    /// Settlement reference from the payment processor
    pub payment_ref: String,
    pub method: PaymentMethod,
    /// Present when the method involves a card
    pub card_number: Option<String>,
}

/// Plan as the billing system sells it
#[derive(Debug, Clone)]
pub struct PlanInfo {
    pub id: i64,
    pub name: String,
    pub list_price: f64,
}

/// One invoice line (product, qty, unit price)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvoiceLine {
    pub product_id: i64,
    pub quantity: u32,
    pub price_unit: f64,
}

/// Paid invoice summary used by renewal-eligibility lookups
#[derive(Debug, Clone)]
pub struct PaidInvoice {
    pub id: i64,
    pub issue_date: NaiveDate,
    pub amount_total: f64,
}

/// Abstract billing collaborator consumed by the orchestrator
#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn read_contact(&self, contact_id: i64) -> CoreResult<Contact>;

    /// Write identity fields to the contact record
    async fn write_contact(&self, contact_id: i64, fields: &IdentityFields) -> CoreResult<()>;

    async fn read_plan(&self, plan_id: i64) -> CoreResult<PlanInfo>;

    /// Create a portal user bound to an existing contact; returns the new
    /// local user id. Never creates a duplicate contact.
    async fn create_portal_user(
        &self,
        contact_id: i64,
        name: &str,
        email: &str,
        mobile: &str,
    ) -> CoreResult<i64>;

    /// Create a draft invoice with the settlement details attached
    async fn create_invoice(
        &self,
        contact_id: i64,
        lines: &[InvoiceLine],
        settlement: &SettlementDetails,
        identity: &IdentityFields,
    ) -> CoreResult<i64>;

    /// Move a draft invoice to posted
    async fn post_invoice(&self, invoice_id: i64) -> CoreResult<()>;

    /// Register a payment for the full amount against a posted invoice.
    /// The currency is the invoice's own.
    async fn register_payment(&self, invoice_id: i64, amount: f64) -> CoreResult<i64>;

    /// Paid invoices for a contact, newest first
    async fn find_paid_invoices_for_contact(&self, contact_id: i64)
        -> CoreResult<Vec<PaidInvoice>>;
}

/// Numeric id out of an ERP relational field, which the backend serializes
/// either as a bare id or as an `[id, display_name]` pair
fn many2one_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::Array(pair) => pair.first().and_then(|v| v.as_i64()),
        _ => None,
    }
}

/// JSON-RPC binding to the ERP backend
pub struct ErpClient {
    config: ErpConfig,
    http: reqwest::Client,
    uid: OnceCell<i64>,
}

impl ErpClient {
    pub fn new(config: ErpConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            uid: OnceCell::new(),
        }
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        args: serde_json::Value,
    ) -> CoreResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": 1,
        });

        let url = format!("{}/jsonrpc", self.config.url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::billing(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::billing(format!(
                "rpc {}.{} failed with {}: {}",
                service, method, status, text
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::billing(e.to_string()))?;

        if let Some(error) = envelope.get("error") {
            return Err(CoreError::billing(format!(
                "rpc {}.{} rejected: {}",
                service, method, error
            )));
        }

        serde_json::from_value(envelope.get("result").cloned().unwrap_or_default())
            .map_err(|e| CoreError::billing(format!("malformed rpc result: {}", e)))
    }

    /// Authenticate once and cache the session uid
    async fn uid(&self) -> CoreResult<i64> {
        self.uid
            .get_or_try_init(|| async {
                let uid: i64 = self
                    .rpc(
                        "common",
                        "authenticate",
                        json!([
                            self.config.database,
                            self.config.username,
                            self.config.password,
                            {}
                        ]),
                    )
                    .await?;
                tracing::debug!(uid = uid, "Authenticated against billing backend");
                Ok(uid)
            })
            .await
            .copied()
    }

    async fn execute_kw<T: DeserializeOwned>(
        &self,
        model: &str,
        method: &str,
        args: serde_json::Value,
        kwargs: serde_json::Value,
    ) -> CoreResult<T> {
        let uid = self.uid().await?;
        self.rpc(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                uid,
                self.config.password,
                model,
                method,
                args,
                kwargs
            ]),
        )
        .await
    }
}

#[async_trait]
impl BillingClient for ErpClient {
    async fn read_contact(&self, contact_id: i64) -> CoreResult<Contact> {
        let rows: Vec<serde_json::Value> = self
            .execute_kw(
                "res.partner",
                "read",
                json!([[contact_id]]),
                json!({ "fields": ["id", "name", "email", "mobile"] }),
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("contact {} does not exist", contact_id)))?;
        serde_json::from_value(row)
            .map_err(|e| CoreError::billing(format!("malformed contact record: {}", e)))
    }

    async fn write_contact(&self, contact_id: i64, fields: &IdentityFields) -> CoreResult<()> {
        let _: bool = self
            .execute_kw(
                "res.partner",
                "write",
                json!([
                    [contact_id],
                    {
                        "company_registry": fields.document_number,
                        "vat": fields.document_number,
                        "l10n_bo_extension": fields.extension,
                        "l10n_latam_identification_type_id": fields.document_type,
                        "l10n_bo_business_name": fields.legal_name,
                    }
                ]),
                json!({}),
            )
            .await?;
        Ok(())
    }

    async fn read_plan(&self, plan_id: i64) -> CoreResult<PlanInfo> {
        let rows: Vec<serde_json::Value> = self
            .execute_kw(
                "product.product",
                "read",
                json!([[plan_id]]),
                json!({ "fields": ["id", "name", "list_price"] }),
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("plan {} does not exist", plan_id)))?;
        Ok(PlanInfo {
            id: row.get("id").and_then(|v| v.as_i64()).unwrap_or(plan_id),
            name: row
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            list_price: row
                .get("list_price")
                .and_then(|v| v.as_f64())
                .unwrap_or_default(),
        })
    }

    async fn create_portal_user(
        &self,
        contact_id: i64,
        name: &str,
        email: &str,
        mobile: &str,
    ) -> CoreResult<i64> {
        let user_id: i64 = self
            .execute_kw(
                "res.users",
                "create",
                json!([{
                    "login": email,
                    "name": name,
                    "email": email,
                    "mobile": mobile,
                    "partner_id": contact_id,
                }]),
                json!({}),
            )
            .await?;
        tracing::info!(
            user_id = user_id,
            contact_id = contact_id,
            "Created portal user in billing backend"
        );
        Ok(user_id)
    }

    async fn create_invoice(
        &self,
        contact_id: i64,
        lines: &[InvoiceLine],
        settlement: &SettlementDetails,
        identity: &IdentityFields,
    ) -> CoreResult<i64> {
        let invoice_lines: Vec<serde_json::Value> = lines
            .iter()
            .map(|line| {
                json!([0, 0, {
                    "product_id": line.product_id,
                    "quantity": line.quantity,
                    "price_unit": line.price_unit,
                }])
            })
            .collect();

        let invoice_id: i64 = self
            .execute_kw(
                "account.move",
                "create",
                json!([{
                    "move_type": "out_invoice",
                    "partner_id": contact_id,
                    "currency_id": BOB_CURRENCY_ID,
                    "payment_reference": settlement.payment_ref,
                    "vr_metodo_pago": settlement.method.billing_code(),
                    "vr_nro_tarjeta": settlement.card_number.clone().unwrap_or_default(),
                    "vr_nit_ci": identity.document_number,
                    "vr_extension": identity.extension,
                    "vr_razon_social": identity.legal_name,
                    "vr_tipo_documento_identidad": identity.document_type,
                    "invoice_line_ids": invoice_lines,
                }]),
                json!({}),
            )
            .await?;
        tracing::info!(
            invoice_id = invoice_id,
            contact_id = contact_id,
            "Created draft invoice"
        );
        Ok(invoice_id)
    }

    async fn post_invoice(&self, invoice_id: i64) -> CoreResult<()> {
        let _: serde_json::Value = self
            .execute_kw("account.move", "action_post", json!([[invoice_id]]), json!({}))
            .await?;
        tracing::info!(invoice_id = invoice_id, "Posted invoice");
        Ok(())
    }

    async fn register_payment(&self, invoice_id: i64, amount: f64) -> CoreResult<i64> {
        // The posted invoice carries the authoritative currency and number;
        // the payment echoes both.
        let rows: Vec<serde_json::Value> = self
            .execute_kw(
                "account.move",
                "read",
                json!([[invoice_id]]),
                json!({ "fields": ["amount_total", "currency_id", "name"] }),
            )
            .await?;
        let invoice = rows.into_iter().next().ok_or_else(|| {
            CoreError::NotFound(format!("invoice {} does not exist", invoice_id))
        })?;
        let currency_id = invoice
            .get("currency_id")
            .and_then(many2one_id)
            .ok_or_else(|| {
                CoreError::billing(format!("invoice {} has no currency", invoice_id))
            })?;
        let invoice_name = invoice
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let register_ids: Vec<i64> = self
            .execute_kw(
                "account.payment.register",
                "create",
                json!([[{
                    "payment_type": "inbound",
                    "amount": amount,
                    "currency_id": currency_id,
                    "communication": invoice_name,
                }]]),
                json!({ "context": {
                    "active_model": "account.move",
                    "active_ids": [invoice_id],
                    "active_id": invoice_id,
                }}),
            )
            .await?;
        let register_id = register_ids
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::billing("payment register returned no id".to_string()))?;

        let _: serde_json::Value = self
            .execute_kw(
                "account.payment.register",
                "action_create_payments",
                json!([[register_id]]),
                json!({}),
            )
            .await?;
        tracing::info!(
            invoice_id = invoice_id,
            payment_id = register_id,
            amount = amount,
            "Registered payment"
        );
        Ok(register_id)
    }

    async fn find_paid_invoices_for_contact(
        &self,
        contact_id: i64,
    ) -> CoreResult<Vec<PaidInvoice>> {
        let rows: Vec<serde_json::Value> = self
            .execute_kw(
                "account.move",
                "search_read",
                json!([[
                    ["partner_id", "=", contact_id],
                    ["payment_state", "=", "paid"],
                    ["state", "=", "posted"]
                ]]),
                json!({
                    "fields": ["id", "invoice_date", "amount_total"],
                    "order": "invoice_date desc",
                }),
            )
            .await?;

        let mut invoices = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let date_str = row
                .get("invoice_date")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let issue_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                CoreError::billing(format!("invoice {} has malformed date: {}", id, e))
            })?;
            invoices.push(PaidInvoice {
                id,
                issue_date,
                amount_total: row
                    .get("amount_total")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default(),
            });
        }
        Ok(invoices)
    }
}
