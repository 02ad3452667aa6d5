//! Circuit breaker state entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::{CircuitBreakerState, CircuitState};

/// Database row mapping for the circuit_breaker_states table.
#[derive(Debug, Clone, FromRow)]
pub struct CircuitBreakerStateEntity {
    pub integration_id: Uuid,
    pub state: String,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CircuitBreakerStateEntity> for CircuitBreakerState {
    fn from(entity: CircuitBreakerStateEntity) -> Self {
        // CHECK constraint on the column keeps this parse infallible in
        // practice.
        let state = entity.state.parse::<CircuitState>().unwrap_or(CircuitState::Closed);

        Self {
            integration_id: entity.integration_id,
            state,
            failure_count: entity.failure_count,
            last_failure_at: entity.last_failure_at,
            opened_at: entity.opened_at,
            next_retry_at: entity.next_retry_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
