//! Credential domain model.
//!
//! Two views exist: [`Credential`] is the decrypted form the rest of the
//! system works with, [`EncryptedCredential`] is the at-rest form the
//! storage layer persists. Only the vault converts between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Deployment environment a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Decrypted credential as seen by callers. Never persisted in this form.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub integration_id: Uuid,
    pub environment: Environment,
    pub api_key: String,
    pub api_secret: Option<String>,
    /// Provider-specific extra secrets (account ids, signing keys, ...).
    pub extra: HashMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// True when `expires_at` is set and strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }
}

/// Input for creating or rotating a credential.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCredential {
    pub integration_id: Uuid,
    pub environment: Environment,

    #[validate(length(min = 1, message = "API key must not be empty"))]
    pub api_key: String,

    pub api_secret: Option<String>,

    #[serde(default)]
    pub extra: HashMap<String, String>,

    pub expires_at: Option<DateTime<Utc>>,
}

/// At-rest credential row: secret columns hold ciphertext only.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedCredential {
    pub id: i64,
    pub integration_id: Uuid,
    pub environment: Environment,
    pub api_key_ciphertext: String,
    pub api_secret_ciphertext: Option<String>,
    /// Encrypted JSON object of the extra map, absent when the map is empty.
    pub extra_ciphertext: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Encrypted payload for an upsert.
#[derive(Debug, Clone)]
pub struct NewEncryptedCredential {
    pub integration_id: Uuid,
    pub environment: Environment,
    pub api_key_ciphertext: String,
    pub api_secret_ciphertext: Option<String>,
    pub extra_ciphertext: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
