//! Credential entity (database row mapping).
//!
//! Secret columns hold ciphertext only; decryption happens in the vault.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{EncryptedCredential, Environment};

/// Database row mapping for the credentials table.
#[derive(Debug, Clone, FromRow)]
pub struct CredentialEntity {
    pub id: i64,
    pub integration_id: Uuid,
    pub environment: String,
    pub api_key_ciphertext: String,
    pub api_secret_ciphertext: Option<String>,
    pub extra_ciphertext: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CredentialEntity> for EncryptedCredential {
    fn from(entity: CredentialEntity) -> Self {
        // The environment column carries a CHECK constraint, so the parse
        // only fails on a schema mismatch.
        let environment = entity
            .environment
            .parse::<Environment>()
            .unwrap_or(Environment::Development);

        Self {
            id: entity.id,
            integration_id: entity.integration_id,
            environment,
            api_key_ciphertext: entity.api_key_ciphertext,
            api_secret_ciphertext: entity.api_secret_ciphertext,
            extra_ciphertext: entity.extra_ciphertext,
            expires_at: entity.expires_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
