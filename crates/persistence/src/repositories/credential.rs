//! Credential repository for database operations.
//!
//! Only ciphertext crosses this boundary; the vault owns the keys.

use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{EncryptedCredential, Environment, NewEncryptedCredential};

use crate::entities::CredentialEntity;
use crate::metrics::QueryTimer;

const CREDENTIAL_COLUMNS: &str = "id, integration_id, environment, api_key_ciphertext, \
     api_secret_ciphertext, extra_ciphertext, expires_at, created_at, updated_at";

/// Repository for credential database operations.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the credential for an (integration, environment) pair.
    pub async fn find(
        &self,
        integration_id: Uuid,
        environment: Environment,
    ) -> Result<Option<EncryptedCredential>, sqlx::Error> {
        let timer = QueryTimer::new("find_credential");
        let entity = sqlx::query_as::<_, CredentialEntity>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials \
             WHERE integration_id = $1 AND environment = $2",
        ))
        .bind(integration_id)
        .bind(environment.to_string())
        .fetch_optional(&self.pool)
        .await?;
        timer.record();

        Ok(entity.map(Into::into))
    }

    /// Insert or rotate a credential for an (integration, environment)
    /// pair.
    pub async fn upsert(
        &self,
        record: NewEncryptedCredential,
    ) -> Result<EncryptedCredential, sqlx::Error> {
        let timer = QueryTimer::new("upsert_credential");
        let entity = sqlx::query_as::<_, CredentialEntity>(&format!(
            r#"
            INSERT INTO credentials (
                integration_id, environment, api_key_ciphertext,
                api_secret_ciphertext, extra_ciphertext, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (integration_id, environment) DO UPDATE
            SET api_key_ciphertext = EXCLUDED.api_key_ciphertext,
                api_secret_ciphertext = EXCLUDED.api_secret_ciphertext,
                extra_ciphertext = EXCLUDED.extra_ciphertext,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            RETURNING {CREDENTIAL_COLUMNS}
            "#,
        ))
        .bind(record.integration_id)
        .bind(record.environment.to_string())
        .bind(&record.api_key_ciphertext)
        .bind(&record.api_secret_ciphertext)
        .bind(&record.extra_ciphertext)
        .bind(record.expires_at)
        .fetch_one(&self.pool)
        .await?;
        timer.record();

        Ok(entity.into())
    }
}
