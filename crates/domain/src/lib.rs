//! Domain layer for the API gateway.
//!
//! This crate contains:
//! - Domain models (Integration, Credential, CircuitBreakerState, RequestLogEntry)
//! - The pure circuit-breaker state machine
//! - The storage interface consumed by the service layer

pub mod models;
pub mod store;
