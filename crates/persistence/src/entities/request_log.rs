//! Request log entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::RequestLogEntry;

/// Database row mapping for the request_logs table.
#[derive(Debug, Clone, FromRow)]
pub struct RequestLogEntity {
    pub id: i64,
    pub integration_id: Uuid,
    pub request_id: Uuid,
    pub method: String,
    pub endpoint: String,
    pub request_headers: serde_json::Value,
    pub request_body: Option<serde_json::Value>,
    pub response_status: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<RequestLogEntity> for RequestLogEntry {
    fn from(entity: RequestLogEntity) -> Self {
        Self {
            id: entity.id,
            integration_id: entity.integration_id,
            request_id: entity.request_id,
            method: entity.method,
            endpoint: entity.endpoint,
            request_headers: entity.request_headers,
            request_body: entity.request_body,
            response_status: entity.response_status,
            response_headers: entity.response_headers,
            response_body: entity.response_body,
            error_message: entity.error_message,
            duration_ms: entity.duration_ms,
            created_at: entity.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::ResponseClass;
    use serde_json::json;

    #[test]
    fn test_entity_to_domain_conversion() {
        let entity = RequestLogEntity {
            id: 42,
            integration_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            method: "POST".to_string(),
            endpoint: "/v1/messages".to_string(),
            request_headers: json!({ "Content-Type": "application/json" }),
            request_body: Some(json!({ "to": "+4915512345678" })),
            response_status: Some(404),
            response_headers: Some(json!({})),
            response_body: Some(json!({ "error": "unknown recipient" })),
            error_message: None,
            duration_ms: Some(87),
            created_at: Utc::now(),
        };

        let entry = RequestLogEntry::from(entity);
        assert_eq!(entry.response_status, Some(404));
        assert_eq!(entry.response_class(), ResponseClass::ClientError);
        assert_eq!(entry.endpoint, "/v1/messages");
    }
}
