//! Integration registry.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use domain::models::{CreateIntegrationRequest, Integration, IntegrationFilter};
use domain::store::GatewayStore;

use crate::error::GatewayError;

/// Lookup and admin surface for integration descriptors.
#[derive(Clone)]
pub struct IntegrationRegistry {
    store: Arc<dyn GatewayStore>,
}

impl IntegrationRegistry {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Register a new integration. Name uniqueness is enforced by the
    /// store and surfaces as a conflict.
    pub async fn create(
        &self,
        request: CreateIntegrationRequest,
    ) -> Result<Integration, GatewayError> {
        request.validate()?;
        let integration = self.store.create_integration(&request).await?;
        info!(
            integration_id = %integration.id,
            name = %integration.name,
            category = %integration.category,
            "Integration registered"
        );
        Ok(integration)
    }

    pub async fn get(&self, id: Uuid) -> Result<Integration, GatewayError> {
        self.store
            .get_integration(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("No integration with id {}", id)))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Integration, GatewayError> {
        self.store
            .get_integration_by_name(name)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("No integration named '{}'", name)))
    }

    /// List integrations; absent filter fields match everything.
    pub async fn list(&self, filter: &IntegrationFilter) -> Result<Vec<Integration>, GatewayError> {
        Ok(self.store.list_integrations(filter).await?)
    }

    /// Activate or deactivate an integration.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<(), GatewayError> {
        if !self.store.set_integration_active(id, active).await? {
            return Err(GatewayError::NotFound(format!("No integration with id {}", id)));
        }
        info!(integration_id = %id, active = active, "Integration active flag updated");
        Ok(())
    }
}
