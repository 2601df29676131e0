//! JWT issuance and verification
//!
//! Tokens are HS256 with a per-deployment secret. Every token carries a JTI
//! so it can be revoked server-side before its natural expiry; the revocation
//! check itself lives in [`super::revocation`].

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Local portal user id
    pub sub: i64,
    /// Token id, the revocation handle
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn generate(&self, user_id: i64) -> ApiResult<(String, Claims)> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4().to_string(),
            iat: now.unix_timestamp(),
            exp: (now + time::Duration::hours(self.expiry_hours)).unix_timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))?;
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {}", e)))
    }
}
