//! Activation request types and entry validation
//!
//! The two workflows are distinct request kinds on the wire, tagged by
//! `kind`, rather than one blob whose meaning depends on server-side state.
//! Validation here is purely syntactic and runs before any external call;
//! business rules (plan existence, already-active) belong to the
//! orchestrator.

use serde::Deserialize;

use crate::billing::IdentityFields;
use crate::catalog::PlanId;
use crate::error::{CoreError, CoreResult};

/// Document number customers without an id document send
pub const NO_DOCUMENT_SENTINEL: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Qr,
    Cash,
}

impl PaymentMethod {
    /// Payment-method id as the billing backend's catalog knows it, stamped
    /// onto every invoice
    pub fn billing_code(&self) -> i64 {
        match self {
            PaymentMethod::Card => 1,
            PaymentMethod::Qr => 2,
            PaymentMethod::Cash => 3,
        }
    }

    pub fn requires_card(&self) -> bool {
        matches!(self, PaymentMethod::Card)
    }
}

/// Fields common to both workflows
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationBody {
    pub contact_id: i64,
    pub plan_id: PlanId,
    #[serde(default)]
    pub second_plan_id: Option<PlanId>,
    /// Settlement reference from the payment processor
    pub payment_ref: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(flatten)]
    pub identity: IdentityFields,
}

/// One activation request, tagged by workflow
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActivationRequest {
    /// First-time activation: may create the remote customer
    New(ActivationBody),
    /// Renewal of a lapsed subscription: never regenerates credentials
    Renewal(ActivationBody),
}

impl ActivationRequest {
    pub fn body(&self) -> &ActivationBody {
        match self {
            ActivationRequest::New(body) | ActivationRequest::Renewal(body) => body,
        }
    }

    pub fn is_renewal(&self) -> bool {
        matches!(self, ActivationRequest::Renewal(_))
    }
}

impl ActivationBody {
    /// Syntactic checks, all before any external call
    pub fn validate(&self) -> CoreResult<()> {
        if self.payment_ref.trim().is_empty() {
            return Err(CoreError::Validation(
                "payment reference must not be empty".to_string(),
            ));
        }

        let doc = self.identity.document_number.trim();
        if doc.is_empty() || !doc.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::Validation(
                "document number must be numeric".to_string(),
            ));
        }
        if doc != NO_DOCUMENT_SENTINEL && doc.len() < 5 {
            return Err(CoreError::Validation(
                "document number must have at least 5 digits".to_string(),
            ));
        }

        if self.payment_method.requires_card() {
            let card = self
                .card_number
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            let well_formed = card.len() == 8
                && card.chars().all(|c| c.is_ascii_digit())
                && matches!(card.chars().next(), Some('4') | Some('5'));
            if !well_formed {
                return Err(CoreError::Validation(
                    "card number must be 8 digits starting with 4 or 5".to_string(),
                ));
            }
        }

        Ok(())
    }
}
