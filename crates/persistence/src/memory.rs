//! In-memory implementation of the storage interface.
//!
//! Used by tests and by embedders that do not want a database. A single
//! mutex serializes every mutation, which also gives the circuit state
//! the per-integration write discipline the interface requires.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use domain::models::{
    CircuitBreakerState, CreateIntegrationRequest, EncryptedCredential, Environment, Integration,
    IntegrationFilter, LogColumn, NewEncryptedCredential, NewRequestLogEntry, RequestLogEntry,
    RequestLogQuery, RequestLogStats,
};
use domain::store::{CircuitMutator, GatewayStore, StoreError};

#[derive(Default)]
struct Inner {
    integrations: HashMap<Uuid, Integration>,
    circuits: HashMap<Uuid, CircuitBreakerState>,
    credentials: HashMap<(Uuid, Environment), EncryptedCredential>,
    logs: Vec<RequestLogEntry>,
    next_log_id: i64,
    next_credential_id: i64,
}

/// Volatile gateway state held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-mutation; propagating the
        // panic is the only sound option here.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn sort_entries(entries: &mut [RequestLogEntry], order_by: LogColumn, descending: bool) {
    entries.sort_by(|a, b| {
        let ordering = match order_by {
            LogColumn::CreatedAt => a.created_at.cmp(&b.created_at),
            LogColumn::DurationMs => a.duration_ms.cmp(&b.duration_ms),
            LogColumn::ResponseStatus => a.response_status.cmp(&b.response_status),
            LogColumn::Method => a.method.cmp(&b.method),
            LogColumn::Endpoint => a.endpoint.cmp(&b.endpoint),
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn create_integration(
        &self,
        request: &CreateIntegrationRequest,
    ) -> Result<Integration, StoreError> {
        let mut inner = self.lock();
        if inner.integrations.values().any(|i| i.name == request.name) {
            return Err(StoreError::Conflict(format!(
                "integration name already exists: {}",
                request.name
            )));
        }

        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            category: request.category.clone(),
            base_url: request.base_url.clone(),
            active: request.active,
            config: request.config.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.integrations.insert(integration.id, integration.clone());
        Ok(integration)
    }

    async fn get_integration(&self, id: Uuid) -> Result<Option<Integration>, StoreError> {
        Ok(self.lock().integrations.get(&id).cloned())
    }

    async fn get_integration_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Integration>, StoreError> {
        Ok(self
            .lock()
            .integrations
            .values()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn list_integrations(
        &self,
        filter: &IntegrationFilter,
    ) -> Result<Vec<Integration>, StoreError> {
        let mut matches: Vec<Integration> = self
            .lock()
            .integrations
            .values()
            .filter(|i| filter.active.map_or(true, |active| i.active == active))
            .filter(|i| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |category| &i.category == category)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    async fn set_integration_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.integrations.get_mut(&id) {
            Some(integration) => {
                integration.active = active;
                integration.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_circuit_state(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<CircuitBreakerState>, StoreError> {
        Ok(self.lock().circuits.get(&integration_id).cloned())
    }

    async fn update_circuit_state(
        &self,
        integration_id: Uuid,
        mutate: CircuitMutator<'_>,
    ) -> Result<CircuitBreakerState, StoreError> {
        let mut inner = self.lock();
        let state = inner
            .circuits
            .entry(integration_id)
            .or_insert_with(|| CircuitBreakerState::new_closed(integration_id, Utc::now()));
        mutate(state);
        Ok(state.clone())
    }

    async fn append_request_log(
        &self,
        entry: NewRequestLogEntry,
    ) -> Result<RequestLogEntry, StoreError> {
        let mut inner = self.lock();
        if !inner.integrations.contains_key(&entry.integration_id) {
            return Err(StoreError::ForeignKey(format!(
                "unknown integration: {}",
                entry.integration_id
            )));
        }

        inner.next_log_id += 1;
        let persisted = RequestLogEntry {
            id: inner.next_log_id,
            integration_id: entry.integration_id,
            request_id: entry.request_id,
            method: entry.method,
            endpoint: entry.endpoint,
            request_headers: entry.request_headers,
            request_body: entry.request_body,
            response_status: entry.response_status,
            response_headers: entry.response_headers,
            response_body: entry.response_body,
            error_message: entry.error_message,
            duration_ms: entry.duration_ms,
            created_at: Utc::now(),
        };
        inner.logs.push(persisted.clone());
        Ok(persisted)
    }

    async fn query_request_logs(
        &self,
        query: &RequestLogQuery,
    ) -> Result<Vec<RequestLogEntry>, StoreError> {
        let mut matches: Vec<RequestLogEntry> = self
            .lock()
            .logs
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();

        sort_entries(&mut matches, query.order_by, query.descending);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let matches: Vec<RequestLogEntry> = match query.limit {
            Some(limit) => matches
                .into_iter()
                .skip(offset)
                .take(limit.max(0) as usize)
                .collect(),
            None => matches.into_iter().skip(offset).collect(),
        };
        Ok(matches)
    }

    async fn request_log_stats(
        &self,
        query: &RequestLogQuery,
    ) -> Result<RequestLogStats, StoreError> {
        let inner = self.lock();
        let matches: Vec<&RequestLogEntry> =
            inner.logs.iter().filter(|entry| query.matches(entry)).collect();

        let total = matches.len() as i64;
        if total == 0 {
            return Ok(RequestLogStats::empty());
        }

        let durations: Vec<i64> = matches.iter().filter_map(|e| e.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        let errors = matches
            .iter()
            .filter(|e| e.error_message.is_some() || matches!(e.response_status, Some(s) if s >= 400))
            .count() as i64;

        let mut status_counts: HashMap<Option<i32>, i64> = HashMap::new();
        let mut method_counts: HashMap<String, i64> = HashMap::new();
        for entry in &matches {
            *status_counts.entry(entry.response_status).or_default() += 1;
            *method_counts.entry(entry.method.clone()).or_default() += 1;
        }

        let mut by_status: Vec<(Option<i32>, i64)> = status_counts.into_iter().collect();
        by_status.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let mut by_method: Vec<(String, i64)> = method_counts.into_iter().collect();
        by_method.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(RequestLogStats {
            total,
            avg_duration_ms,
            error_rate_pct: (errors as f64 / total as f64) * 100.0,
            by_status,
            by_method,
        })
    }

    async fn get_credential(
        &self,
        integration_id: Uuid,
        environment: Environment,
    ) -> Result<Option<EncryptedCredential>, StoreError> {
        Ok(self
            .lock()
            .credentials
            .get(&(integration_id, environment))
            .cloned())
    }

    async fn upsert_credential(
        &self,
        record: NewEncryptedCredential,
    ) -> Result<EncryptedCredential, StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let key = (record.integration_id, record.environment);

        let persisted = match inner.credentials.get(&key) {
            Some(existing) => EncryptedCredential {
                api_key_ciphertext: record.api_key_ciphertext,
                api_secret_ciphertext: record.api_secret_ciphertext,
                extra_ciphertext: record.extra_ciphertext,
                expires_at: record.expires_at,
                updated_at: now,
                ..existing.clone()
            },
            None => {
                inner.next_credential_id += 1;
                EncryptedCredential {
                    id: inner.next_credential_id,
                    integration_id: record.integration_id,
                    environment: record.environment,
                    api_key_ciphertext: record.api_key_ciphertext,
                    api_secret_ciphertext: record.api_secret_ciphertext,
                    extra_ciphertext: record.extra_ciphertext,
                    expires_at: record.expires_at,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        inner.credentials.insert(key, persisted.clone());
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::IntegrationConfig;
    use serde_json::json;

    fn create_request(name: &str) -> CreateIntegrationRequest {
        CreateIntegrationRequest {
            name: name.to_string(),
            category: "payment".to_string(),
            base_url: "https://api.example.com".to_string(),
            active: true,
            config: IntegrationConfig::default(),
        }
    }

    fn log_entry(integration_id: Uuid, status: Option<i32>, method: &str) -> NewRequestLogEntry {
        NewRequestLogEntry {
            integration_id,
            request_id: Uuid::new_v4(),
            method: method.to_string(),
            endpoint: "/v1/test".to_string(),
            request_headers: json!({}),
            request_body: None,
            response_status: status,
            response_headers: None,
            response_body: None,
            error_message: if status.is_none() {
                Some("connection refused".to_string())
            } else {
                None
            },
            duration_ms: Some(100),
        }
    }

    #[tokio::test]
    async fn test_integration_name_conflict() {
        let store = MemoryStore::new();
        store.create_integration(&create_request("stripe")).await.unwrap();

        let err = store
            .create_integration(&create_request("stripe"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_integrations_filters() {
        let store = MemoryStore::new();
        store.create_integration(&create_request("stripe")).await.unwrap();
        let other = store
            .create_integration(&CreateIntegrationRequest {
                category: "weather".to_string(),
                active: false,
                ..create_request("openweather")
            })
            .await
            .unwrap();

        let active_only = store
            .list_integrations(&IntegrationFilter {
                active: Some(true),
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].name, "stripe");

        let weather = store
            .list_integrations(&IntegrationFilter {
                active: None,
                category: Some("weather".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(weather.len(), 1);
        assert_eq!(weather[0].id, other.id);
    }

    #[tokio::test]
    async fn test_circuit_state_created_lazily() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(store.get_circuit_state(id).await.unwrap().is_none());

        let state = store.update_circuit_state(id, &|_s| false).await.unwrap();
        assert_eq!(state.failure_count, 0);
        assert!(store.get_circuit_state(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_circuit_mutator_applies() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let state = store
            .update_circuit_state(id, &|s| {
                s.failure_count += 1;
                true
            })
            .await
            .unwrap();
        assert_eq!(state.failure_count, 1);

        let state = store
            .update_circuit_state(id, &|s| {
                s.failure_count += 1;
                true
            })
            .await
            .unwrap();
        assert_eq!(state.failure_count, 2);
    }

    #[tokio::test]
    async fn test_append_log_requires_known_integration() {
        let store = MemoryStore::new();
        let err = store
            .append_request_log(log_entry(Uuid::new_v4(), Some(200), "GET"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn test_log_query_and_stats() {
        let store = MemoryStore::new();
        let integration = store.create_integration(&create_request("stripe")).await.unwrap();

        store
            .append_request_log(log_entry(integration.id, Some(200), "GET"))
            .await
            .unwrap();
        store
            .append_request_log(log_entry(integration.id, Some(404), "POST"))
            .await
            .unwrap();
        store
            .append_request_log(log_entry(integration.id, None, "GET"))
            .await
            .unwrap();

        let mut query = RequestLogQuery::for_integration(integration.id);
        query.status_min = Some(400);
        let errors = store.query_request_logs(&query).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].response_status, Some(404));

        let stats = store
            .request_log_stats(&RequestLogQuery::for_integration(integration.id))
            .await
            .unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.avg_duration_ms, Some(100.0));
        assert!((stats.error_rate_pct - 66.666).abs() < 0.01);
        assert_eq!(stats.by_method, vec![("GET".to_string(), 2), ("POST".to_string(), 1)]);
        assert_eq!(
            stats.by_status,
            vec![(Some(200), 1), (Some(404), 1), (None, 1)]
        );
    }

    #[tokio::test]
    async fn test_log_ordering_and_pagination() {
        let store = MemoryStore::new();
        let integration = store.create_integration(&create_request("stripe")).await.unwrap();

        for status in [200, 201, 503] {
            store
                .append_request_log(log_entry(integration.id, Some(status), "GET"))
                .await
                .unwrap();
        }

        let mut query = RequestLogQuery::for_integration(integration.id);
        query.order_by = LogColumn::ResponseStatus;
        query.descending = false;
        query.limit = Some(2);
        query.offset = Some(1);

        let page = store.query_request_logs(&query).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].response_status, Some(201));
        assert_eq!(page[1].response_status, Some(503));
    }

    #[tokio::test]
    async fn test_credential_upsert_rotates() {
        let store = MemoryStore::new();
        let integration_id = Uuid::new_v4();

        let first = store
            .upsert_credential(NewEncryptedCredential {
                integration_id,
                environment: Environment::Production,
                api_key_ciphertext: "ct1".to_string(),
                api_secret_ciphertext: None,
                extra_ciphertext: None,
                expires_at: None,
            })
            .await
            .unwrap();

        let second = store
            .upsert_credential(NewEncryptedCredential {
                integration_id,
                environment: Environment::Production,
                api_key_ciphertext: "ct2".to_string(),
                api_secret_ciphertext: None,
                extra_ciphertext: None,
                expires_at: None,
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.api_key_ciphertext, "ct2");

        let fetched = store
            .get_credential(integration_id, Environment::Production)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.api_key_ciphertext, "ct2");
        assert!(store
            .get_credential(integration_id, Environment::Staging)
            .await
            .unwrap()
            .is_none());
    }
}
