//! HTTP error mapping
//!
//! The core crate reports outcomes, not status codes; the translation lives
//! here in one place. The one mapping that matters operationally:
//! [`CoreError::PartiallyFailed`] becomes a 502 whose body carries the
//! committed invoice and payment ids, because a client retry would bill the
//! customer twice.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use streambill_core::CoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Core(CoreError::Database(e.to_string()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(core) => match core {
                CoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::BusinessRule(_) | CoreError::DuplicateUser(_) => StatusCode::CONFLICT,
                CoreError::ExternalService { .. } | CoreError::PartiallyFailed { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                CoreError::Notification(_)
                | CoreError::Crypto(_)
                | CoreError::Database(_)
                | CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Core(CoreError::PartiallyFailed {
                invoice_id,
                payment_id,
                message,
            }) => json!({
                "error": "provisioning failed after billing succeeded; do not retry",
                "detail": message,
                "invoiceId": invoice_id,
                "paymentId": payment_id,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
