//! Circuit breaker state and transitions.
//!
//! The state machine is implemented as pure functions on
//! [`CircuitBreakerState`] so every transition is deterministic and
//! unit-testable with explicit timestamps. The service layer applies
//! these functions through the store's atomic update primitive; this
//! module never touches storage or the wall clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Consecutive failures that trip the breaker open.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Seconds the breaker stays open before allowing a probe.
pub const DEFAULT_OPEN_TIMEOUT_SECS: i64 = 60;

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Downstream assumed failing, requests are rejected.
    Open,
    /// Cooldown elapsed, a probe request is allowed through.
    HalfOpen,
}

impl FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            _ => Err(format!("Unknown circuit state: {}", s)),
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Outcome of a gate check against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Request may proceed.
    Allow,
    /// Open window elapsed: transition to half-open, then allow.
    Probe,
    /// Request rejected; retry after the given number of seconds.
    Deny { retry_in_secs: i64 },
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted while closed, breaker stays closed.
    Counted(i32),
    /// This failure crossed the threshold and opened the breaker.
    Opened,
    /// Probe failure while half-open reopened the breaker.
    Reopened,
    /// Breaker already open; nothing changed.
    Ignored,
}

/// Persisted resilience state for one integration (1:1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub integration_id: Uuid,
    pub state: CircuitState,
    /// Consecutive failures observed while closed; never negative.
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CircuitBreakerState {
    /// Fresh closed state for an integration seen for the first time.
    pub fn new_closed(integration_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            integration_id,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            opened_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole seconds until the next probe, rounded up. Zero when ready.
    pub fn retry_in_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.next_retry_at {
            Some(at) if at > now => {
                let millis = (at - now).num_milliseconds();
                (millis + 999) / 1000
            }
            _ => 0,
        }
    }

    /// Decides whether a request may proceed right now.
    ///
    /// `now == next_retry_at` counts as ready: the caller should apply
    /// [`CircuitBreakerState::transition_half_open`] and allow.
    pub fn gate_decision(&self, now: DateTime<Utc>) -> GateDecision {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => GateDecision::Allow,
            CircuitState::Open => match self.next_retry_at {
                Some(at) if now < at => GateDecision::Deny {
                    retry_in_secs: self.retry_in_secs(now),
                },
                _ => GateDecision::Probe,
            },
        }
    }

    /// Open -> half-open: clears the retry deadline, keeps the counter.
    pub fn transition_half_open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::HalfOpen;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Records a success. Returns whether the row changed.
    ///
    /// Half-open: a single successful probe fully closes the breaker.
    /// Closed with a non-zero counter: the counter resets. Open: no-op,
    /// a success here means a caller bypassed the gate. Closed with a
    /// zero counter: no write at all, the row stays byte-for-byte
    /// identical.
    pub fn apply_success(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                self.last_failure_at = None;
                self.opened_at = None;
                self.next_retry_at = None;
                self.updated_at = now;
                true
            }
            CircuitState::Closed if self.failure_count > 0 => {
                self.failure_count = 0;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Records a failure.
    ///
    /// Closed: increments the counter; crossing `threshold` opens the
    /// breaker with `next_retry_at = now + open_timeout`. Half-open: a
    /// failed probe reopens unconditionally with a fresh deadline and
    /// an unchanged counter. Open: ignored.
    pub fn apply_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        open_timeout: Duration,
    ) -> FailureOutcome {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                self.last_failure_at = Some(now);
                self.updated_at = now;
                if self.failure_count >= threshold as i32 {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    self.next_retry_at = Some(now + open_timeout);
                    FailureOutcome::Opened
                } else {
                    FailureOutcome::Counted(self.failure_count)
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.next_retry_at = Some(now + open_timeout);
                self.updated_at = now;
                FailureOutcome::Reopened
            }
            CircuitState::Open => FailureOutcome::Ignored,
        }
    }

    /// Operator action: force the breaker open with a fresh retry window.
    pub fn force_open(&mut self, now: DateTime<Utc>, open_timeout: Duration) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.next_retry_at = Some(now + open_timeout);
        self.updated_at = now;
    }

    /// Operator action: force closed with zeroed counters.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_at = None;
        self.opened_at = None;
        self.next_retry_at = None;
        self.updated_at = now;
    }
}
