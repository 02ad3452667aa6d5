//! Repository implementations for database operations.

pub mod circuit_breaker;
pub mod credential;
pub mod integration;
pub mod request_log;

pub use circuit_breaker::CircuitBreakerRepository;
pub use credential::CredentialRepository;
pub use integration::IntegrationRepository;
pub use request_log::RequestLogRepository;
