//! Request authentication middleware

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use sqlx::PgPool;

use crate::auth::{revocation, JwtManager};
use crate::error::ApiError;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
    pub pool: PgPool,
}

/// The authenticated caller, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub jti: String,
    pub exp: i64,
}

/// Verify the bearer token and reject revoked sessions
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let claims = state.jwt.verify(token)?;

    if revocation::is_revoked(&state.pool, &claims.jti).await? {
        return Err(ApiError::Unauthorized("token has been revoked".to_string()));
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        jti: claims.jti,
        exp: claims.exp,
    });
    Ok(next.run(request).await)
}
