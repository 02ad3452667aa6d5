//! PostgreSQL implementation of the storage interface.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::{
    CircuitBreakerState, CreateIntegrationRequest, EncryptedCredential, Environment, Integration,
    IntegrationFilter, NewEncryptedCredential, NewRequestLogEntry, RequestLogEntry,
    RequestLogQuery, RequestLogStats,
};
use domain::store::{CircuitMutator, GatewayStore, StoreError};

use crate::repositories::{
    CircuitBreakerRepository, CredentialRepository, IntegrationRepository, RequestLogRepository,
};

/// Durable gateway state backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    integrations: IntegrationRepository,
    circuits: CircuitBreakerRepository,
    logs: RequestLogRepository,
    credentials: CredentialRepository,
}

impl PgStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            integrations: IntegrationRepository::new(pool.clone()),
            circuits: CircuitBreakerRepository::new(pool.clone()),
            logs: RequestLogRepository::new(pool.clone()),
            credentials: CredentialRepository::new(pool),
        }
    }
}

#[async_trait]
impl GatewayStore for PgStore {
    async fn create_integration(
        &self,
        request: &CreateIntegrationRequest,
    ) -> Result<Integration, StoreError> {
        Ok(self.integrations.insert(request).await?)
    }

    async fn get_integration(&self, id: Uuid) -> Result<Option<Integration>, StoreError> {
        Ok(self.integrations.find_by_id(id).await?)
    }

    async fn get_integration_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Integration>, StoreError> {
        Ok(self.integrations.find_by_name(name).await?)
    }

    async fn list_integrations(
        &self,
        filter: &IntegrationFilter,
    ) -> Result<Vec<Integration>, StoreError> {
        Ok(self.integrations.list(filter).await?)
    }

    async fn set_integration_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        Ok(self.integrations.set_active(id, active).await?)
    }

    async fn get_circuit_state(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<CircuitBreakerState>, StoreError> {
        Ok(self.circuits.find(integration_id).await?)
    }

    async fn update_circuit_state(
        &self,
        integration_id: Uuid,
        mutate: CircuitMutator<'_>,
    ) -> Result<CircuitBreakerState, StoreError> {
        Ok(self.circuits.update_with(integration_id, mutate).await?)
    }

    async fn append_request_log(
        &self,
        entry: NewRequestLogEntry,
    ) -> Result<RequestLogEntry, StoreError> {
        Ok(self.logs.insert(entry).await?)
    }

    async fn query_request_logs(
        &self,
        query: &RequestLogQuery,
    ) -> Result<Vec<RequestLogEntry>, StoreError> {
        Ok(self.logs.list(query).await?)
    }

    async fn request_log_stats(
        &self,
        query: &RequestLogQuery,
    ) -> Result<RequestLogStats, StoreError> {
        Ok(self.logs.stats(query).await?)
    }

    async fn get_credential(
        &self,
        integration_id: Uuid,
        environment: Environment,
    ) -> Result<Option<EncryptedCredential>, StoreError> {
        Ok(self.credentials.find(integration_id, environment).await?)
    }

    async fn upsert_credential(
        &self,
        record: NewEncryptedCredential,
    ) -> Result<EncryptedCredential, StoreError> {
        Ok(self.credentials.upsert(record).await?)
    }
}
