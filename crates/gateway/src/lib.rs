//! Resilient outbound API gateway.
//!
//! Mediates calls to third-party HTTP APIs: each integration is guarded
//! by a persisted circuit breaker, credentials are encrypted at rest,
//! and every dispatch leaves a sanitized audit entry.

use std::sync::Arc;

use domain::store::GatewayStore;
use persistence::PgStore;
use shared::crypto::SecretCipher;

pub mod config;
pub mod error;
pub mod services;
pub mod telemetry;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use services::{
    AuditLog, CircuitBreaker, DispatchResponse, Dispatcher, IntegrationRegistry, RequestBody,
    RequestOptions, Vault,
};

/// The wired-up service layer over one store.
pub struct Gateway {
    pub registry: IntegrationRegistry,
    pub vault: Vault,
    pub breaker: CircuitBreaker,
    pub dispatcher: Dispatcher,
    pub audit: AuditLog,
}

impl Gateway {
    /// Assemble the services over an existing store.
    pub fn new(store: Arc<dyn GatewayStore>, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let cipher = SecretCipher::from_encoded(&config.vault.master_key)?;
        let breaker = CircuitBreaker::new(store.clone(), &config.circuit_breaker);
        Ok(Self {
            registry: IntegrationRegistry::new(store.clone()),
            vault: Vault::new(store.clone(), cipher),
            breaker: breaker.clone(),
            dispatcher: Dispatcher::new(store.clone(), breaker, config.dispatch.clone()),
            audit: AuditLog::new(store),
        })
    }

    /// Connect to PostgreSQL, apply migrations, and assemble the services.
    pub async fn connect(config: &GatewayConfig) -> anyhow::Result<Self> {
        let pool = persistence::db::create_pool(&config.database.pool_config()).await?;
        persistence::db::run_migrations(&pool).await?;
        let store: Arc<dyn GatewayStore> = Arc::new(PgStore::new(pool));
        Ok(Self::new(store, config)?)
    }
}
