//! Domain models for the API gateway.

pub mod circuit_breaker;
pub mod credential;
pub mod integration;
pub mod request_log;

pub use circuit_breaker::{
    CircuitBreakerState, CircuitState, FailureOutcome, GateDecision, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_OPEN_TIMEOUT_SECS,
};
pub use credential::{Credential, EncryptedCredential, Environment, NewCredential, NewEncryptedCredential};
pub use integration::{CreateIntegrationRequest, Integration, IntegrationConfig, IntegrationFilter};
pub use request_log::{
    LogColumn, NewRequestLogEntry, RequestLogEntry, RequestLogQuery, RequestLogStats, ResponseClass,
};
