//! Persisted token revocation
//!
//! Revoked JTIs live in the `revoked_tokens` table so revocation survives
//! restarts and is shared across replicas. Rows are kept until the token they
//! shadow would have expired anyway, then purged.

use sqlx::PgPool;
use time::OffsetDateTime;

use crate::auth::Claims;
use crate::error::{ApiError, ApiResult};

/// Record a token as revoked. Idempotent: revoking an already-revoked token
/// keeps the original row and returns false.
pub async fn revoke_token(pool: &PgPool, claims: &Claims, reason: &str) -> ApiResult<bool> {
    let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
        .map_err(|e| ApiError::Internal(format!("token carries invalid expiry: {}", e)))?;

    let rows_affected = sqlx::query(
        r#"
        INSERT INTO revoked_tokens (jti, user_id, expires_at, reason)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(&claims.jti)
    .bind(claims.sub)
    .bind(expires_at)
    .bind(reason)
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected > 0 {
        tracing::info!(user_id = claims.sub, jti = %claims.jti, reason = reason, "Token revoked");
    }
    Ok(rows_affected > 0)
}

/// Check whether a JTI has been revoked
pub async fn is_revoked(pool: &PgPool, jti: &str) -> ApiResult<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = $1")
        .bind(jti)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Drop revocation rows for tokens that have expired on their own
pub async fn purge_expired(pool: &PgPool) -> ApiResult<u64> {
    let rows_affected = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();
    if rows_affected > 0 {
        tracing::debug!(purged = rows_affected, "Purged expired revocation rows");
    }
    Ok(rows_affected)
}
