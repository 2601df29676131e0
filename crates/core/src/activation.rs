//! Activation workflow
//!
//! The orchestrator drives one activation end to end: validate the request,
//! resolve the customer's true state from billing and the provisioning
//! platform, bill, provision, notify. The write order is fixed and the
//! guarantees are asymmetric:
//!
//! * nothing external is written until eligibility is settled;
//! * once eligible, the billing leg (invoice, post, payment) always runs;
//! * billing is never rolled back, so a provisioning failure after a
//!   committed payment surfaces as [`CoreError::PartiallyFailed`] with the
//!   invoice and payment ids an operator needs;
//! * a failed credential email is a warning on a successful outcome, never a
//!   failure.
//!
//! Whether the customer exists on the provisioning platform, not whether we
//! hold a local record, decides create-versus-update. The two can disagree
//! after manual interventions on either side and the platform wins.

use chrono::NaiveDate;
use serde::Serialize;

use crate::billing::{BillingClient, Contact, InvoiceLine, SettlementDetails};
use crate::catalog::{PlanCatalog, ProvisionProfile};
use crate::error::{CoreError, CoreResult};
use crate::expiration::{invoice_window_active, remote_plan_status, RemotePlanStatus};
use crate::notify::{CredentialNotice, CredentialNotifier};
use crate::provisioning::{
    CreateCustomerPayload, CustomerIdentity, ProvisioningClient, UpdateCustomerPayload,
};
use crate::requests::ActivationRequest;
use crate::vault::{NewLocalAccount, VaultStore};

/// What the provisioning platform answered for this activation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningReport {
    /// True when this activation created the remote customer record
    pub created_remote_customer: bool,
    /// Acknowledgement body from the create or update call
    pub response: serde_json::Value,
}

/// Report returned for a fully or partially successful activation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    /// Local portal user the credential vault record is keyed by
    pub user_id: i64,
    /// Remote customer id on the provisioning platform
    pub customer_id: String,
    pub invoice_id: i64,
    pub payment_id: i64,
    pub provisioning: ProvisioningReport,
    /// Non-fatal problems (today: credential email delivery)
    pub warnings: Vec<String>,
}

/// How the customer looks on the provisioning platform before any write
enum RemoteState {
    Absent,
    Present { status: RemotePlanStatus },
}

pub struct ActivationService<B, P, N, V> {
    billing: B,
    provisioning: P,
    notifier: N,
    vault: V,
    catalog: PlanCatalog,
    customer_prefix: String,
}

#[cfg(test)]
impl<B, P, N, V> ActivationService<B, P, N, V> {
    pub(crate) fn billing(&self) -> &B {
        &self.billing
    }

    pub(crate) fn provisioning(&self) -> &P {
        &self.provisioning
    }

    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }

    pub(crate) fn vault(&self) -> &V {
        &self.vault
    }
}

impl<B, P, N, V> ActivationService<B, P, N, V>
where
    B: BillingClient,
    P: ProvisioningClient,
    N: CredentialNotifier,
    V: VaultStore,
{
    pub fn new(billing: B, provisioning: P, notifier: N, vault: V, customer_prefix: String) -> Self {
        Self {
            billing,
            provisioning,
            notifier,
            vault,
            catalog: PlanCatalog::new(),
            customer_prefix,
        }
    }

    fn customer_id_for(&self, user_id: i64) -> String {
        format!("{}{}", self.customer_prefix, user_id)
    }

    /// Run one activation. `today` is injected so eligibility windows are
    /// testable; callers pass the current civil date.
    pub async fn activate(
        &self,
        request: &ActivationRequest,
        today: NaiveDate,
    ) -> CoreResult<ActivationOutcome> {
        let body = request.body();
        body.validate()?;

        // Plan resolution is pure; an unknown plan rejects before any call.
        let profile = self
            .catalog
            .entitlements_for(body.plan_id, body.second_plan_id, today)?;

        let contact = self.billing.read_contact(body.contact_id).await?;
        let local = self.vault.find_by_contact(body.contact_id).await?;

        if request.is_renewal() && local.is_none() {
            return Err(CoreError::NotFound(format!(
                "no local account for contact {}",
                body.contact_id
            )));
        }

        // Billing-side activity signal: a paid invoice younger than the
        // subscription window means the customer is already covered.
        let paid = self
            .billing
            .find_paid_invoices_for_contact(body.contact_id)
            .await?;
        if let Some(latest) = paid.first() {
            if invoice_window_active(latest.issue_date, today) {
                return Err(CoreError::BusinessRule(format!(
                    "subscription already active until invoice {} expires",
                    latest.id
                )));
            }
        }

        // Provisioning-side signal, only resolvable once we know the user id
        let remote = match &local {
            Some(account) => {
                let customer_id = self.customer_id_for(account.user_id);
                match self.provisioning.get_customer(&customer_id).await? {
                    Some(record) => RemoteState::Present {
                        status: remote_plan_status(&record.subscribe_service, today),
                    },
                    None => RemoteState::Absent,
                }
            }
            None => RemoteState::Absent,
        };

        if let RemoteState::Present {
            status: RemotePlanStatus::Active,
            ..
        } = remote
        {
            return Err(CoreError::BusinessRule(
                "subscription is already active on the provisioning platform".to_string(),
            ));
        }

        // Eligibility settled. Resolve or create the local account before any
        // billing write so the only post-payment failure mode left is
        // provisioning itself.
        let (user_id, password, fresh_credentials) = match &local {
            Some(account) => (account.user_id, self.vault.reveal(account.user_id).await?, false),
            None => {
                let user_id = self
                    .billing
                    .create_portal_user(
                        contact.id,
                        &contact.name,
                        &contact.email,
                        &contact.mobile,
                    )
                    .await?;
                let password = crate::password::generate_password();
                self.vault
                    .store(
                        &NewLocalAccount {
                            user_id,
                            contact_id: contact.id,
                            first_name: contact.name.clone(),
                            last_name: String::new(),
                            email: contact.email.clone(),
                            mobile: contact.mobile.clone(),
                        },
                        &password,
                    )
                    .await?;
                (user_id, password, true)
            }
        };
        let customer_id = self.customer_id_for(user_id);

        // Billing leg. Unconditional from here on and never rolled back.
        self.billing
            .write_contact(contact.id, &body.identity)
            .await?;
        let (invoice_id, payment_id) = self.bill(body, &contact).await?;

        // Provisioning leg. Any failure past this point is a partial one.
        let provisioning = self
            .provision(&remote, &customer_id, &contact, &password, &profile, today)
            .await
            .map_err(|e| CoreError::PartiallyFailed {
                invoice_id,
                payment_id,
                message: e.to_string(),
            })?;

        let mut warnings = Vec::new();

        // First acceptance wins; repeat activations leave the timestamp alone
        if let Err(e) = self.vault.mark_policy_accepted(user_id).await {
            tracing::warn!(user_id = user_id, error = %e, "Policy acceptance not recorded");
            warnings.push(format!("policy acceptance not recorded: {}", e));
        }

        if fresh_credentials {
            let notice = CredentialNotice {
                to: contact.email.clone(),
                first_name: contact.name.clone(),
                login: customer_id.clone(),
                password,
            };
            if let Err(e) = self.notifier.send_credentials(&notice).await {
                tracing::warn!(user_id = user_id, error = %e, "Credential email not delivered");
                warnings.push(format!("credential email not delivered: {}", e));
            }
        }

        tracing::info!(
            user_id = user_id,
            customer_id = %customer_id,
            invoice_id = invoice_id,
            payment_id = payment_id,
            created = provisioning.created_remote_customer,
            "Activation completed"
        );
        Ok(ActivationOutcome {
            user_id,
            customer_id,
            invoice_id,
            payment_id,
            provisioning,
            warnings,
        })
    }

    /// Invoice, post, pay. Returns `(invoice_id, payment_id)`.
    async fn bill(
        &self,
        body: &crate::requests::ActivationBody,
        contact: &Contact,
    ) -> CoreResult<(i64, i64)> {
        let mut lines = Vec::new();
        let mut total = 0.0;
        for plan_id in std::iter::once(body.plan_id).chain(body.second_plan_id) {
            let plan = self.billing.read_plan(plan_id).await?;
            total += plan.list_price;
            lines.push(InvoiceLine {
                product_id: plan.id,
                quantity: 1,
                price_unit: plan.list_price,
            });
        }

        let settlement = SettlementDetails {
            payment_ref: body.payment_ref.clone(),
            method: body.payment_method,
            card_number: body.card_number.clone(),
        };
        let invoice_id = self
            .billing
            .create_invoice(contact.id, &lines, &settlement, &body.identity)
            .await?;
        self.billing.post_invoice(invoice_id).await?;
        let payment_id = self.billing.register_payment(invoice_id, total).await?;
        Ok((invoice_id, payment_id))
    }

    /// Create or refresh the remote customer, carrying the platform's
    /// acknowledgement into the outcome
    async fn provision(
        &self,
        remote: &RemoteState,
        customer_id: &str,
        contact: &Contact,
        password: &str,
        profile: &ProvisionProfile,
        today: NaiveDate,
    ) -> CoreResult<ProvisioningReport> {
        match remote {
            RemoteState::Absent => {
                let identity = CustomerIdentity {
                    first_name: contact.name.clone(),
                    email: contact.email.clone(),
                    mobile: contact.mobile.clone(),
                };
                let payload =
                    CreateCustomerPayload::build(customer_id, &identity, password, profile, today);
                let ack = self.provisioning.create_customer(&payload).await?;
                Ok(ProvisioningReport {
                    created_remote_customer: true,
                    response: ack.response,
                })
            }
            RemoteState::Present { .. } => {
                // Lapsed customer: wipe the stale grants, push the new set.
                // The stored password is reused untouched.
                self.provisioning.delete_entitlements(customer_id).await?;
                let payload = UpdateCustomerPayload::build(profile);
                let ack = self
                    .provisioning
                    .update_customer(customer_id, &payload)
                    .await?;
                Ok(ProvisioningReport {
                    created_remote_customer: false,
                    response: ack.response,
                })
            }
        }
    }
}
