//! Credential vault.
//!
//! The only place plaintext and ciphertext meet: `put` encrypts before
//! the store sees anything, `get` decrypts before the caller does.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use domain::models::{Credential, Environment, NewCredential, NewEncryptedCredential};
use domain::store::GatewayStore;
use shared::crypto::{CryptoError, SecretCipher};

use crate::error::GatewayError;

/// Encrypted credential storage for integrations.
#[derive(Clone)]
pub struct Vault {
    store: Arc<dyn GatewayStore>,
    cipher: SecretCipher,
}

impl Vault {
    pub fn new(store: Arc<dyn GatewayStore>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    /// Store or rotate a credential.
    ///
    /// Validation happens before any storage access: the api_key must be
    /// non-empty and `expires_at`, when set, must lie in the future.
    pub async fn put(&self, input: NewCredential) -> Result<(), GatewayError> {
        input.validate()?;
        if let Some(at) = input.expires_at {
            if at <= Utc::now() {
                return Err(GatewayError::InvalidParams(
                    "expires_at must be in the future".to_string(),
                ));
            }
        }

        let api_key_ciphertext = self.cipher.encrypt(&input.api_key)?;
        let api_secret_ciphertext = input
            .api_secret
            .as_deref()
            .map(|secret| self.cipher.encrypt(secret))
            .transpose()?;
        let extra_ciphertext = if input.extra.is_empty() {
            None
        } else {
            let json = serde_json::to_string(&input.extra)
                .map_err(|e| GatewayError::InvalidParams(format!("Invalid extra map: {}", e)))?;
            Some(self.cipher.encrypt(&json)?)
        };

        self.store
            .upsert_credential(NewEncryptedCredential {
                integration_id: input.integration_id,
                environment: input.environment,
                api_key_ciphertext,
                api_secret_ciphertext,
                extra_ciphertext,
                expires_at: input.expires_at,
            })
            .await?;

        info!(
            integration_id = %input.integration_id,
            environment = %input.environment,
            key_fingerprint = self.cipher.key_fingerprint(),
            "Credential stored"
        );
        Ok(())
    }

    /// Fetch and decrypt the credential for an (integration, environment)
    /// pair. NotFound when none is stored.
    pub async fn get(
        &self,
        integration_id: Uuid,
        environment: Environment,
    ) -> Result<Credential, GatewayError> {
        let record = self
            .store
            .get_credential(integration_id, environment)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "No {} credential for integration {}",
                    environment, integration_id
                ))
            })?;

        let api_key = self.cipher.decrypt(&record.api_key_ciphertext)?;
        let api_secret = record
            .api_secret_ciphertext
            .as_deref()
            .map(|ct| self.cipher.decrypt(ct))
            .transpose()?;
        let extra: HashMap<String, String> = match record.extra_ciphertext.as_deref() {
            Some(ct) => {
                let json = self.cipher.decrypt(ct)?;
                serde_json::from_str(&json).map_err(|e| {
                    GatewayError::Crypto(CryptoError::MalformedCiphertext(format!(
                        "extra map is not valid JSON: {}",
                        e
                    )))
                })?
            }
            None => HashMap::new(),
        };

        debug!(
            integration_id = %integration_id,
            environment = %environment,
            "Credential fetched"
        );

        Ok(Credential {
            integration_id: record.integration_id,
            environment: record.environment,
            api_key,
            api_secret,
            extra,
            expires_at: record.expires_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
