//! Audit log read surface.
//!
//! Entries are appended by the dispatcher; this service only queries.

use std::sync::Arc;

use domain::models::{RequestLogEntry, RequestLogQuery, RequestLogStats};
use domain::store::GatewayStore;

use crate::error::GatewayError;

/// Query access to the sanitized request log.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn GatewayStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Entries matching the query's filters, ordered and paginated.
    pub async fn query(&self, query: &RequestLogQuery) -> Result<Vec<RequestLogEntry>, GatewayError> {
        Ok(self.store.query_request_logs(query).await?)
    }

    /// Aggregates over all entries matching the query's filters.
    pub async fn stats(&self, query: &RequestLogQuery) -> Result<RequestLogStats, GatewayError> {
        Ok(self.store.request_log_stats(query).await?)
    }
}
