//! Credential vault
//!
//! Stores the OTT playback credential per local user, encrypted at rest with
//! AES-256-GCM. Ciphertext is `base64(nonce || ct)` with a fresh random nonce
//! per write. The vault row also carries the contact binding and the
//! policy-acceptance timestamp; there is at most one row per user id.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::config::VaultConfig;
use crate::error::{CoreError, CoreResult};

const NONCE_LEN: usize = 12;

/// Symmetric cipher wrapper, split out so it can be tested without a pool
#[derive(Clone)]
pub(crate) struct VaultCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCipher").finish_non_exhaustive()
    }
}

impl VaultCipher {
    fn from_config(config: &VaultConfig) -> CoreResult<Self> {
        let key_bytes = BASE64
            .decode(&config.encryption_key)
            .map_err(|e| CoreError::Config(format!("vault key is not valid base64: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(CoreError::Config(format!(
                "vault key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Crypto("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn decrypt(&self, encoded: &str) -> CoreResult<String> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|_| CoreError::Crypto("ciphertext is not valid base64".to_string()))?;
        if blob.len() <= NONCE_LEN {
            return Err(CoreError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Crypto("decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Crypto("decrypted credential is not utf-8".to_string()))
    }
}

/// One vault row, sans the credential itself
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocalAccount {
    pub user_id: i64,
    pub contact_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub policy_accepted_at: Option<OffsetDateTime>,
}

/// Fields for a first-time vault insert
#[derive(Debug, Clone)]
pub struct NewLocalAccount {
    pub user_id: i64,
    pub contact_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
}

/// The subset of vault operations the activation workflow depends on
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn find_by_contact(&self, contact_id: i64) -> CoreResult<Option<LocalAccount>>;
    async fn store(&self, account: &NewLocalAccount, plaintext: &str) -> CoreResult<()>;
    async fn reveal(&self, user_id: i64) -> CoreResult<String>;
    async fn mark_policy_accepted(&self, user_id: i64) -> CoreResult<bool>;
}

pub struct CredentialVault {
    pool: PgPool,
    cipher: VaultCipher,
}

impl CredentialVault {
    pub fn new(pool: PgPool, config: &VaultConfig) -> CoreResult<Self> {
        Ok(Self {
            pool,
            cipher: VaultCipher::from_config(config)?,
        })
    }

    /// Insert a new vault record. Fails with [`CoreError::DuplicateUser`] if
    /// one already exists for this user id; existing credentials are never
    /// silently replaced.
    pub async fn store(&self, account: &NewLocalAccount, plaintext: &str) -> CoreResult<()> {
        let ciphertext = self.cipher.encrypt(plaintext)?;
        let result = sqlx::query(
            r#"
            INSERT INTO local_accounts
                (user_id, contact_id, first_name, last_name, email, mobile, password_ciphertext)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(account.user_id)
        .bind(account.contact_id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.email)
        .bind(&account.mobile)
        .bind(&ciphertext)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::DuplicateUser(account.user_id));
        }
        tracing::info!(user_id = account.user_id, "Stored credential vault record");
        Ok(())
    }

    /// Decrypt and return the credential for a user
    pub async fn reveal(&self, user_id: i64) -> CoreResult<String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_ciphertext FROM local_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let (ciphertext,) = row.ok_or_else(|| {
            CoreError::NotFound(format!("no vault record for user {}", user_id))
        })?;
        self.cipher.decrypt(&ciphertext)
    }

    /// Replace the stored credential with a freshly encrypted one
    pub async fn rotate(&self, user_id: i64, plaintext: &str) -> CoreResult<()> {
        let ciphertext = self.cipher.encrypt(plaintext)?;
        let result =
            sqlx::query("UPDATE local_accounts SET password_ciphertext = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(&ciphertext)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "no vault record for user {}",
                user_id
            )));
        }
        tracing::info!(user_id = user_id, "Rotated vault credential");
        Ok(())
    }

    /// Stamp policy acceptance. Idempotent: the first acceptance wins and the
    /// timestamp is never overwritten. Returns true when this call set it.
    pub async fn mark_policy_accepted(&self, user_id: i64) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE local_accounts
            SET policy_accepted_at = NOW()
            WHERE user_id = $1 AND policy_accepted_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn account(&self, user_id: i64) -> CoreResult<Option<LocalAccount>> {
        let account = sqlx::query_as::<_, LocalAccount>(
            r#"
            SELECT user_id, contact_id, first_name, last_name, email, mobile, policy_accepted_at
            FROM local_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    /// Look up the vault record bound to a billing contact, if any
    pub async fn find_by_contact(&self, contact_id: i64) -> CoreResult<Option<LocalAccount>> {
        let account = sqlx::query_as::<_, LocalAccount>(
            r#"
            SELECT user_id, contact_id, first_name, last_name, email, mobile, policy_accepted_at
            FROM local_accounts
            WHERE contact_id = $1
            ORDER BY user_id
            LIMIT 1
            "#,
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn exists(&self, user_id: i64) -> CoreResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM local_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl<T: VaultStore> VaultStore for std::sync::Arc<T> {
    async fn find_by_contact(&self, contact_id: i64) -> CoreResult<Option<LocalAccount>> {
        (**self).find_by_contact(contact_id).await
    }

    async fn store(&self, account: &NewLocalAccount, plaintext: &str) -> CoreResult<()> {
        (**self).store(account, plaintext).await
    }

    async fn reveal(&self, user_id: i64) -> CoreResult<String> {
        (**self).reveal(user_id).await
    }

    async fn mark_policy_accepted(&self, user_id: i64) -> CoreResult<bool> {
        (**self).mark_policy_accepted(user_id).await
    }
}

#[async_trait]
impl VaultStore for CredentialVault {
    async fn find_by_contact(&self, contact_id: i64) -> CoreResult<Option<LocalAccount>> {
        CredentialVault::find_by_contact(self, contact_id).await
    }

    async fn store(&self, account: &NewLocalAccount, plaintext: &str) -> CoreResult<()> {
        CredentialVault::store(self, account, plaintext).await
    }

    async fn reveal(&self, user_id: i64) -> CoreResult<String> {
        CredentialVault::reveal(self, user_id).await
    }

    async fn mark_policy_accepted(&self, user_id: i64) -> CoreResult<bool> {
        CredentialVault::mark_policy_accepted(self, user_id).await
    }
}
