//! Error taxonomy for the activation core
//!
//! Every fallible operation in this crate returns [`CoreResult`]. The variants
//! map one-to-one to the outcomes callers have to distinguish: reject before
//! any write (validation, not-found, business rule), abort mid-workflow
//! (external service), or report a billing-succeeded/provisioning-failed split
//! ([`CoreError::PartiallyFailed`]). The boundary layer translates these to
//! transport responses; this crate never reasons in HTTP terms.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Which remote system an [`CoreError::ExternalService`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSystem {
    /// The billing/ERP backend (contacts, invoices, payments)
    Billing,
    /// The OTT provisioning platform (customers, entitlements)
    Provisioning,
}

impl std::fmt::Display for RemoteSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteSystem::Billing => write!(f, "billing"),
            RemoteSystem::Provisioning => write!(f, "provisioning"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input, rejected before any external call
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced plan, contact, or local account does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Business rule rejected the request (e.g. subscription already active).
    /// No writes have occurred when this is returned.
    #[error("business rule violation: {0}")]
    BusinessRule(String),

    /// A remote call failed before any billing write succeeded
    #[error("{system} call failed: {message}")]
    ExternalService {
        system: RemoteSystem,
        message: String,
    },

    /// Provisioning failed after billing already committed. Carries the
    /// identifiers an operator needs to reconcile manually; billing is never
    /// rolled back automatically.
    #[error("provisioning failed after billing succeeded (invoice {invoice_id}, payment {payment_id}): {message}")]
    PartiallyFailed {
        invoice_id: i64,
        payment_id: i64,
        message: String,
    },

    /// Credential email could not be delivered. Surfaced as a warning by the
    /// orchestrator, never as the activation outcome.
    #[error("notification failed: {0}")]
    Notification(String),

    /// A vault record already exists for this user id
    #[error("credential record already exists for user {0}")]
    DuplicateUser(i64),

    /// Vault encryption/decryption failure (bad key, corrupt ciphertext)
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Local database failure
    #[error("database error: {0}")]
    Database(String),

    /// Missing or malformed configuration
    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn billing(message: impl Into<String>) -> Self {
        CoreError::ExternalService {
            system: RemoteSystem::Billing,
            message: message.into(),
        }
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        CoreError::ExternalService {
            system: RemoteSystem::Provisioning,
            message: message.into(),
        }
    }

    /// True when the error was raised before any external write
    pub fn is_pre_write(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::NotFound(_) | CoreError::BusinessRule(_)
        )
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Database(e.to_string())
    }
}
