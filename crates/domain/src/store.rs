//! Storage interface consumed by the service layer.
//!
//! Implementations must serialize circuit-state read-modify-write per
//! integration: [`GatewayStore::update_circuit_state`] applies its mutator
//! under whatever exclusion the backend provides (row lock, mutex), so
//! the Nth failure crossing the threshold performs the one and only
//! transition to open regardless of concurrent writers.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CircuitBreakerState, CreateIntegrationRequest, EncryptedCredential, Environment, Integration,
    IntegrationFilter, NewEncryptedCredential, NewRequestLogEntry, RequestLogEntry,
    RequestLogQuery, RequestLogStats,
};

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Referenced resource not found: {0}")]
    ForeignKey(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => StoreError::Conflict(db_err.to_string()),
                        "23503" => StoreError::ForeignKey(db_err.to_string()),
                        _ => StoreError::Database(db_err.to_string()),
                    }
                } else {
                    StoreError::Database(db_err.to_string())
                }
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// In-place mutation of a circuit state row. Returns whether the row
/// changed; `false` means the backend skips the write entirely.
pub type CircuitMutator<'a> = &'a (dyn Fn(&mut CircuitBreakerState) -> bool + Send + Sync);

/// Durable state behind the gateway: integrations, credentials, circuit
/// breaker rows and the append-only request log.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    // Integrations

    async fn create_integration(
        &self,
        request: &CreateIntegrationRequest,
    ) -> Result<Integration, StoreError>;

    async fn get_integration(&self, id: Uuid) -> Result<Option<Integration>, StoreError>;

    async fn get_integration_by_name(&self, name: &str)
        -> Result<Option<Integration>, StoreError>;

    async fn list_integrations(
        &self,
        filter: &IntegrationFilter,
    ) -> Result<Vec<Integration>, StoreError>;

    /// Returns false when the integration does not exist.
    async fn set_integration_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError>;

    // Circuit breaker

    async fn get_circuit_state(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<CircuitBreakerState>, StoreError>;

    /// Atomically mutates the state row for one integration, creating it
    /// closed if absent, and returns the post-mutation snapshot.
    async fn update_circuit_state(
        &self,
        integration_id: Uuid,
        mutate: CircuitMutator<'_>,
    ) -> Result<CircuitBreakerState, StoreError>;

    // Request log

    async fn append_request_log(
        &self,
        entry: NewRequestLogEntry,
    ) -> Result<RequestLogEntry, StoreError>;

    async fn query_request_logs(
        &self,
        query: &RequestLogQuery,
    ) -> Result<Vec<RequestLogEntry>, StoreError>;

    async fn request_log_stats(
        &self,
        query: &RequestLogQuery,
    ) -> Result<RequestLogStats, StoreError>;

    // Credentials

    async fn get_credential(
        &self,
        integration_id: Uuid,
        environment: Environment,
    ) -> Result<Option<EncryptedCredential>, StoreError>;

    async fn upsert_credential(
        &self,
        record: NewEncryptedCredential,
    ) -> Result<EncryptedCredential, StoreError>;
}
