//! Circuit breaker service.
//!
//! Applies the pure transitions from `domain::models::circuit_breaker`
//! through the store's atomic update, so concurrent recordings for the
//! same integration serialize and the threshold-crossing failure is the
//! one and only open transition.

use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use domain::models::{CircuitBreakerState, CircuitState, FailureOutcome, GateDecision};
use domain::store::GatewayStore;

use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;

/// Per-integration circuit breaker over the shared store.
#[derive(Clone)]
pub struct CircuitBreaker {
    store: Arc<dyn GatewayStore>,
    threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn GatewayStore>, config: &CircuitBreakerConfig) -> Self {
        Self {
            store,
            threshold: config.failure_threshold,
            open_timeout: Duration::seconds(config.open_timeout_secs),
        }
    }

    /// Gate a dispatch for an integration.
    ///
    /// Closed and half-open allow. Open denies until `next_retry_at`;
    /// once the deadline is reached the state atomically moves to
    /// half-open and the request proceeds as the probe. An integration
    /// never seen before gets a closed row and passes.
    pub async fn check_request(&self, integration_id: Uuid) -> Result<(), GatewayError> {
        let now = Utc::now();
        let mutate = move |state: &mut CircuitBreakerState| match state.gate_decision(now) {
            GateDecision::Probe => {
                state.transition_half_open(now);
                true
            }
            _ => false,
        };
        let state = self
            .store
            .update_circuit_state(integration_id, &mutate)
            .await?;

        match state.gate_decision(now) {
            GateDecision::Allow => Ok(()),
            // Post-mutation the probe transition has already happened;
            // the snapshot can only report Probe on a stale clock, and
            // the request is allowed through either way.
            GateDecision::Probe => {
                debug!(integration_id = %integration_id, "Allowing probe request");
                Ok(())
            }
            GateDecision::Deny { retry_in_secs } => {
                debug!(
                    integration_id = %integration_id,
                    retry_in_secs = retry_in_secs,
                    "Dispatch denied by open circuit"
                );
                Err(GatewayError::CircuitOpen { retry_in_secs })
            }
        }
    }

    /// Record a successful dispatch. Returns whether the state row
    /// changed; a success on a clean closed breaker writes nothing.
    pub async fn record_success(&self, integration_id: Uuid) -> Result<bool, GatewayError> {
        let now = Utc::now();
        let result = Mutex::new((false, false));
        let mutate = |state: &mut CircuitBreakerState| {
            let was_half_open = state.state == CircuitState::HalfOpen;
            let applied = state.apply_success(now);
            if let Ok(mut slot) = result.lock() {
                *slot = (applied, applied && was_half_open);
            }
            applied
        };
        self.store
            .update_circuit_state(integration_id, &mutate)
            .await?;

        let (applied, recovered) = result.lock().map(|slot| *slot).unwrap_or((false, false));
        if recovered {
            info!(
                integration_id = %integration_id,
                "Circuit breaker closed after successful probe"
            );
        }
        Ok(applied)
    }

    /// Record a failed dispatch and return the transition outcome.
    pub async fn record_failure(&self, integration_id: Uuid) -> Result<FailureOutcome, GatewayError> {
        let now = Utc::now();
        let threshold = self.threshold;
        let open_timeout = self.open_timeout;
        let outcome = Mutex::new(FailureOutcome::Ignored);
        let mutate = |state: &mut CircuitBreakerState| {
            let o = state.apply_failure(now, threshold, open_timeout);
            if let Ok(mut slot) = outcome.lock() {
                *slot = o;
            }
            !matches!(o, FailureOutcome::Ignored)
        };
        let state = self
            .store
            .update_circuit_state(integration_id, &mutate)
            .await?;

        let outcome = outcome.lock().map(|slot| *slot).unwrap_or(FailureOutcome::Ignored);
        match outcome {
            FailureOutcome::Opened => {
                warn!(
                    integration_id = %integration_id,
                    failure_count = state.failure_count,
                    next_retry_at = ?state.next_retry_at,
                    "Circuit breaker opened due to consecutive failures"
                );
            }
            FailureOutcome::Reopened => {
                warn!(
                    integration_id = %integration_id,
                    next_retry_at = ?state.next_retry_at,
                    "Circuit breaker reopened after failed probe"
                );
            }
            FailureOutcome::Counted(count) => {
                debug!(
                    integration_id = %integration_id,
                    failure_count = count,
                    "Failure recorded, circuit still closed"
                );
            }
            FailureOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    /// Current state for an integration; NotFound when never exercised.
    pub async fn get_state(&self, integration_id: Uuid) -> Result<CircuitBreakerState, GatewayError> {
        self.store
            .get_circuit_state(integration_id)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "No circuit breaker state for integration {}",
                    integration_id
                ))
            })
    }

    /// Operator action: force the breaker closed with zeroed counters.
    pub async fn reset(&self, integration_id: Uuid) -> Result<CircuitBreakerState, GatewayError> {
        let now = Utc::now();
        let mutate = move |state: &mut CircuitBreakerState| {
            state.reset(now);
            true
        };
        let state = self
            .store
            .update_circuit_state(integration_id, &mutate)
            .await?;
        info!(integration_id = %integration_id, "Circuit breaker reset");
        Ok(state)
    }

    /// Operator action: force the breaker open with a fresh retry window.
    pub async fn force_open(&self, integration_id: Uuid) -> Result<CircuitBreakerState, GatewayError> {
        let now = Utc::now();
        let open_timeout = self.open_timeout;
        let mutate = move |state: &mut CircuitBreakerState| {
            state.force_open(now, open_timeout);
            true
        };
        let state = self
            .store
            .update_circuit_state(integration_id, &mutate)
            .await?;
        warn!(integration_id = %integration_id, "Circuit breaker forced open");
        Ok(state)
    }
}
