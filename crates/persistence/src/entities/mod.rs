//! Entity definitions (database row mappings).

pub mod circuit_breaker;
pub mod credential;
pub mod integration;
pub mod request_log;

pub use circuit_breaker::CircuitBreakerStateEntity;
pub use credential::CredentialEntity;
pub use integration::IntegrationEntity;
pub use request_log::RequestLogEntity;
