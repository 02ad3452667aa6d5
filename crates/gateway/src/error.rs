//! Gateway error taxonomy.
//!
//! Every public operation returns [`GatewayError`]. Callers branch on the
//! variant; logs carry the stable [`GatewayError::kind`] string.

use serde_json::Value;
use shared::crypto::CryptoError;
use thiserror::Error;

use domain::store::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Input rejected before any I/O was attempted.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The circuit breaker denied the dispatch. No request was sent.
    #[error("Circuit breaker is open. Retry in {retry_in_secs} seconds")]
    CircuitOpen { retry_in_secs: i64 },

    /// The downstream did not answer within the per-call timeout.
    #[error("Request timed out")]
    Timeout,

    /// TCP connect (or DNS/TLS during connect) failed.
    #[error("Connection refused")]
    ConnectionRefused,

    /// The downstream answered with a 4xx/5xx status.
    #[error("HTTP error {status}")]
    Http { status: u16, body: Value },

    /// Caller required a body and the downstream returned none.
    #[error("Empty response body")]
    EmptyResponse,

    /// Any other HTTP client failure, passed through opaquely.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl GatewayError {
    /// Stable machine-readable error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidParams(_) => "invalid_params",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::CircuitOpen { .. } => "circuit_breaker_open",
            GatewayError::Timeout => "timeout",
            GatewayError::ConnectionRefused => "connection_refused",
            GatewayError::Http { .. } => "http_error",
            GatewayError::EmptyResponse => "empty_response",
            GatewayError::Transport(_) => "transport",
            GatewayError::Crypto(_) => "crypto",
            GatewayError::Storage(_) => "storage",
        }
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{}: {}", field, message)
                })
            })
            .collect();
        GatewayError::InvalidParams(details.join("; "))
    }
}
