//! Circuit breaker state repository for database operations.
//!
//! All mutations go through [`CircuitBreakerRepository::update_with`],
//! which takes a row lock so concurrent failure recordings for the same
//! integration serialize instead of racing the counter.

use sqlx::PgPool;
use uuid::Uuid;

use domain::models::CircuitBreakerState;
use domain::store::CircuitMutator;

use crate::entities::CircuitBreakerStateEntity;
use crate::metrics::QueryTimer;

const STATE_COLUMNS: &str = "integration_id, state, failure_count, last_failure_at, \
     opened_at, next_retry_at, created_at, updated_at";

/// Repository for circuit breaker state database operations.
#[derive(Clone)]
pub struct CircuitBreakerRepository {
    pool: PgPool,
}

impl CircuitBreakerRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the state row for an integration, if it has ever been
    /// exercised.
    pub async fn find(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<CircuitBreakerState>, sqlx::Error> {
        let timer = QueryTimer::new("find_circuit_state");
        let entity = sqlx::query_as::<_, CircuitBreakerStateEntity>(&format!(
            "SELECT {STATE_COLUMNS} FROM circuit_breaker_states WHERE integration_id = $1",
        ))
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.record();

        Ok(entity.map(Into::into))
    }

    /// Atomically mutate the state row for one integration.
    ///
    /// Creates the row closed if absent, locks it with `FOR UPDATE`,
    /// applies the mutator, and writes back only when the mutator
    /// reports a change. Returns the post-mutation snapshot.
    pub async fn update_with(
        &self,
        integration_id: Uuid,
        mutate: CircuitMutator<'_>,
    ) -> Result<CircuitBreakerState, sqlx::Error> {
        let timer = QueryTimer::new("update_circuit_state");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO circuit_breaker_states (integration_id)
            VALUES ($1)
            ON CONFLICT (integration_id) DO NOTHING
            "#,
        )
        .bind(integration_id)
        .execute(&mut *tx)
        .await?;

        let entity = sqlx::query_as::<_, CircuitBreakerStateEntity>(&format!(
            "SELECT {STATE_COLUMNS} FROM circuit_breaker_states \
             WHERE integration_id = $1 FOR UPDATE",
        ))
        .bind(integration_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut state = CircuitBreakerState::from(entity);
        if mutate(&mut state) {
            sqlx::query(
                r#"
                UPDATE circuit_breaker_states
                SET state = $2,
                    failure_count = $3,
                    last_failure_at = $4,
                    opened_at = $5,
                    next_retry_at = $6,
                    updated_at = $7
                WHERE integration_id = $1
                "#,
            )
            .bind(integration_id)
            .bind(state.state.to_string())
            .bind(state.failure_count)
            .bind(state.last_failure_at)
            .bind(state.opened_at)
            .bind(state.next_retry_at)
            .bind(state.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();

        Ok(state)
    }
}
