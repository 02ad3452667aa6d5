//! Request log (audit trail) domain model.
//!
//! Entries are append-only and immutable once written. Headers and bodies
//! are sanitized by the dispatcher before they reach the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One persisted dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: i64,
    pub integration_id: Uuid,
    /// Correlation id; not uniqueness-enforced in storage.
    pub request_id: Uuid,
    pub method: String,
    /// Path only, query strings are not persisted.
    pub endpoint: String,
    pub request_headers: Value,
    pub request_body: Option<Value>,
    pub response_status: Option<i32>,
    pub response_headers: Option<Value>,
    pub response_body: Option<Value>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RequestLogEntry {
    /// Classifies this entry for read-side analytics.
    pub fn response_class(&self) -> ResponseClass {
        ResponseClass::classify(self.response_status, self.error_message.as_deref())
    }
}

/// Input for appending a log entry.
#[derive(Debug, Clone)]
pub struct NewRequestLogEntry {
    pub integration_id: Uuid,
    pub request_id: Uuid,
    pub method: String,
    pub endpoint: String,
    pub request_headers: Value,
    pub request_body: Option<Value>,
    pub response_status: Option<i32>,
    pub response_headers: Option<Value>,
    pub response_body: Option<Value>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Coarse outcome classification of a logged attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
    /// No status but an error message: transport-level failure.
    Error,
    Unknown,
}

impl ResponseClass {
    /// 2xx success, 3xx redirect, 4xx client_error, 5xx server_error;
    /// no status with an error message -> error; neither -> unknown.
    pub fn classify(status: Option<i32>, error_message: Option<&str>) -> Self {
        match status {
            Some(s) if (200..300).contains(&s) => ResponseClass::Success,
            Some(s) if (300..400).contains(&s) => ResponseClass::Redirect,
            Some(s) if (400..500).contains(&s) => ResponseClass::ClientError,
            Some(s) if (500..600).contains(&s) => ResponseClass::ServerError,
            Some(_) => ResponseClass::Unknown,
            None if error_message.is_some() => ResponseClass::Error,
            None => ResponseClass::Unknown,
        }
    }
}

impl std::fmt::Display for ResponseClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseClass::Success => write!(f, "success"),
            ResponseClass::Redirect => write!(f, "redirect"),
            ResponseClass::ClientError => write!(f, "client_error"),
            ResponseClass::ServerError => write!(f, "server_error"),
            ResponseClass::Error => write!(f, "error"),
            ResponseClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Sortable columns of the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogColumn {
    CreatedAt,
    DurationMs,
    ResponseStatus,
    Method,
    Endpoint,
}

impl LogColumn {
    /// Column name in the `request_logs` table.
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogColumn::CreatedAt => "created_at",
            LogColumn::DurationMs => "duration_ms",
            LogColumn::ResponseStatus => "response_status",
            LogColumn::Method => "method",
            LogColumn::Endpoint => "endpoint",
        }
    }
}

/// Filters and ordering for querying the request log.
///
/// Every filter is optional; absent filters match everything. Default
/// order is newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestLogQuery {
    pub integration_id: Option<Uuid>,
    pub method: Option<String>,
    pub status: Option<i32>,
    pub status_min: Option<i32>,
    pub status_max: Option<i32>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `Some(true)` matches entries with an error message, `Some(false)`
    /// those without.
    pub has_error: Option<bool>,
    pub order_by: LogColumn,
    pub descending: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for RequestLogQuery {
    fn default() -> Self {
        Self {
            integration_id: None,
            method: None,
            status: None,
            status_min: None,
            status_max: None,
            min_duration_ms: None,
            max_duration_ms: None,
            from: None,
            to: None,
            has_error: None,
            order_by: LogColumn::CreatedAt,
            descending: true,
            limit: None,
            offset: None,
        }
    }
}

impl RequestLogQuery {
    /// Query scoped to one integration, default ordering.
    pub fn for_integration(integration_id: Uuid) -> Self {
        Self {
            integration_id: Some(integration_id),
            ..Default::default()
        }
    }

    /// True when `entry` matches every set filter. Shared by the
    /// in-memory store and useful for verifying SQL filters in tests.
    pub fn matches(&self, entry: &RequestLogEntry) -> bool {
        if let Some(id) = self.integration_id {
            if entry.integration_id != id {
                return false;
            }
        }
        if let Some(ref method) = self.method {
            if !entry.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.response_status != Some(status) {
                return false;
            }
        }
        if let Some(min) = self.status_min {
            if !matches!(entry.response_status, Some(s) if s >= min) {
                return false;
            }
        }
        if let Some(max) = self.status_max {
            if !matches!(entry.response_status, Some(s) if s <= max) {
                return false;
            }
        }
        if let Some(min) = self.min_duration_ms {
            if !matches!(entry.duration_ms, Some(d) if d >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_duration_ms {
            if !matches!(entry.duration_ms, Some(d) if d <= max) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        if let Some(has_error) = self.has_error {
            if entry.error_message.is_some() != has_error {
                return false;
            }
        }
        true
    }
}

/// Aggregates over the request log for a given filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogStats {
    pub total: i64,
    pub avg_duration_ms: Option<f64>,
    /// Share of entries with an error message or status >= 400, as a
    /// percentage of the total.
    pub error_rate_pct: f64,
    /// Counts per response status; `None` groups entries without one.
    pub by_status: Vec<(Option<i32>, i64)>,
    pub by_method: Vec<(String, i64)>,
}

impl RequestLogStats {
    pub fn empty() -> Self {
        Self {
            total: 0,
            avg_duration_ms: None,
            error_rate_pct: 0.0,
            by_status: Vec::new(),
            by_method: Vec::new(),
        }
    }
}
