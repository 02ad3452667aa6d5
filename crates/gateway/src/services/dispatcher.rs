//! Resilient HTTP dispatcher.
//!
//! Every outbound call goes through [`Dispatcher::execute`]: the circuit
//! breaker gates before any I/O, the request runs against a per-host
//! connection pool, and each attempted dispatch for a known integration
//! leaves exactly one sanitized audit entry.

use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use domain::models::NewRequestLogEntry;
use domain::store::GatewayStore;
use shared::sanitize::{sanitize_headers, sanitize_value};

use crate::config::DispatchConfig;
use crate::error::GatewayError;
use crate::services::circuit_breaker::CircuitBreaker;

/// Request body accepted by the dispatcher.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as JSON.
    Json(Value),
    /// Sent verbatim.
    Text(String),
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers; they win over the dispatcher defaults,
    /// case-insensitively by name.
    pub headers: Vec<(String, String)>,

    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,

    /// Enables circuit breaking and audit logging when set.
    pub integration_id: Option<Uuid>,
}

impl RequestOptions {
    /// Options tied to an integration, everything else default.
    pub fn for_integration(integration_id: Uuid) -> Self {
        Self {
            integration_id: Some(integration_id),
            ..Default::default()
        }
    }
}

/// Successful dispatch outcome (status < 400).
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub request_id: Uuid,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Parsed JSON body; a raw string when the body was not JSON, an
    /// empty object when the body was empty.
    pub body: Value,
}

impl DispatchResponse {
    /// The body, or [`GatewayError::EmptyResponse`] when the downstream
    /// returned nothing.
    pub fn require_body(&self) -> Result<&Value, GatewayError> {
        match &self.body {
            Value::Object(map) if map.is_empty() => Err(GatewayError::EmptyResponse),
            body => Ok(body),
        }
    }
}

/// Outbound HTTP dispatcher with circuit breaking and audit logging.
pub struct Dispatcher {
    store: Arc<dyn GatewayStore>,
    breaker: CircuitBreaker,
    config: DispatchConfig,
    /// One pooled client per downstream host, so a saturated or failing
    /// host cannot starve another host's connections.
    clients: Mutex<HashMap<String, Client>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn GatewayStore>, breaker: CircuitBreaker, config: DispatchConfig) -> Self {
        Self {
            store,
            breaker,
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<DispatchResponse, GatewayError> {
        self.execute(Method::GET, url, None, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<DispatchResponse, GatewayError> {
        self.execute(Method::POST, url, body, options).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<DispatchResponse, GatewayError> {
        self.execute(Method::PUT, url, body, options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<DispatchResponse, GatewayError> {
        self.execute(Method::PATCH, url, body, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<DispatchResponse, GatewayError> {
        self.execute(Method::DELETE, url, None, options).await
    }

    /// Dispatch one request.
    ///
    /// A circuit-breaker denial short-circuits before any network I/O:
    /// no audit entry is written and no failure is counted. Every
    /// attempted dispatch with an integration id is audited exactly
    /// once, whatever its outcome.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<DispatchResponse, GatewayError> {
        let parsed_url = Url::parse(url)
            .map_err(|e| GatewayError::InvalidParams(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(GatewayError::InvalidParams(format!(
                "URL must be http(s): {}",
                url
            )));
        }
        let host = parsed_url
            .host_str()
            .ok_or_else(|| GatewayError::InvalidParams(format!("URL has no host: {}", url)))?
            .to_string();

        let request_id = Uuid::new_v4();

        if let Some(integration_id) = options.integration_id {
            self.breaker.check_request(integration_id).await?;
        }

        let headers = merge_headers(&self.default_headers(), &options.headers);
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.config.timeout_ms));

        let client = self.client_for(&host)?;
        let mut request = client.request(method.clone(), parsed_url.clone()).timeout(timeout);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &body {
            Some(RequestBody::Json(value)) => {
                let encoded = serde_json::to_vec(value).map_err(|e| {
                    GatewayError::InvalidParams(format!("Body is not serializable: {}", e))
                })?;
                request.body(encoded)
            }
            Some(RequestBody::Text(text)) => request.body(text.clone()),
            None => request,
        };

        debug!(
            request_id = %request_id,
            method = %method,
            host = %host,
            endpoint = parsed_url.path(),
            "Dispatching request"
        );

        let started = Instant::now();
        let outcome = self.send_and_read(request).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok((status, response_headers, response_body)) => {
                let failed = status >= 400;
                self.record_outcome(options.integration_id, !failed).await;
                self.append_audit(
                    options.integration_id,
                    request_id,
                    &method,
                    &parsed_url,
                    &headers,
                    body.as_ref(),
                    Some(status),
                    Some(&response_headers),
                    Some(&response_body),
                    None,
                    duration_ms,
                )
                .await;

                if failed {
                    Err(GatewayError::Http {
                        status,
                        body: response_body,
                    })
                } else {
                    Ok(DispatchResponse {
                        request_id,
                        status,
                        headers: response_headers,
                        body: response_body,
                    })
                }
            }
            Err(err) => {
                self.record_outcome(options.integration_id, false).await;
                self.append_audit(
                    options.integration_id,
                    request_id,
                    &method,
                    &parsed_url,
                    &headers,
                    body.as_ref(),
                    None,
                    None,
                    None,
                    Some(err.to_string()),
                    duration_ms,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Send the request and read the body, classifying client errors.
    async fn send_and_read(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, Vec<(String, String)>, Value), GatewayError> {
        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let text = response.text().await.map_err(classify_transport_error)?;
        Ok((status, headers, parse_body(&text)))
    }

    /// Breaker bookkeeping after the network attempt. Failures here must
    /// not override the dispatch outcome the caller gets.
    async fn record_outcome(&self, integration_id: Option<Uuid>, success: bool) {
        let Some(integration_id) = integration_id else {
            return;
        };
        let result = if success {
            self.breaker.record_success(integration_id).await.map(|_| ())
        } else {
            self.breaker.record_failure(integration_id).await.map(|_| ())
        };
        if let Err(e) = result {
            warn!(
                integration_id = %integration_id,
                error = %e,
                "Failed to update circuit breaker state"
            );
        }
    }

    /// Append the sanitized audit entry for an attempted dispatch.
    #[allow(clippy::too_many_arguments)]
    async fn append_audit(
        &self,
        integration_id: Option<Uuid>,
        request_id: Uuid,
        method: &Method,
        url: &Url,
        request_headers: &[(String, String)],
        request_body: Option<&RequestBody>,
        response_status: Option<u16>,
        response_headers: Option<&[(String, String)]>,
        response_body: Option<&Value>,
        error_message: Option<String>,
        duration_ms: i64,
    ) {
        let Some(integration_id) = integration_id else {
            return;
        };

        let entry = NewRequestLogEntry {
            integration_id,
            request_id,
            method: method.to_string(),
            // Path only; query strings may carry secrets.
            endpoint: url.path().to_string(),
            request_headers: sanitize_headers(request_headers),
            request_body: request_body.map(|body| match body {
                RequestBody::Json(value) => sanitize_value(value),
                RequestBody::Text(text) => Value::String(text.clone()),
            }),
            response_status: response_status.map(i32::from),
            response_headers: response_headers.map(sanitize_headers),
            response_body: response_body.map(sanitize_value),
            error_message,
            duration_ms: Some(duration_ms),
        };

        if let Err(e) = self.store.append_request_log(entry).await {
            warn!(
                integration_id = %integration_id,
                request_id = %request_id,
                error = %e,
                "Failed to append audit log entry"
            );
        }
    }

    /// Headers applied unless the caller overrides them.
    fn default_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ]
    }

    /// Pooled client for a downstream host, created on first use and
    /// sized by the host's pool class.
    fn client_for(&self, host: &str) -> Result<Client, GatewayError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(host) {
            return Ok(client.clone());
        }

        let (max_idle, idle_timeout_secs) = self.config.pool_for(host);
        let client = Client::builder()
            .pool_max_idle_per_host(max_idle)
            .pool_idle_timeout(Duration::from_secs(idle_timeout_secs))
            .build()?;
        clients.insert(host.to_string(), client.clone());
        Ok(client)
    }
}

/// Defaults first, caller headers replacing any default with the same
/// name, compared case-insensitively.
fn merge_headers(
    defaults: &[(String, String)],
    caller: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = defaults
        .iter()
        .filter(|(name, _)| {
            !caller
                .iter()
                .any(|(caller_name, _)| caller_name.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect();
    merged.extend(caller.iter().cloned());
    merged
}

/// Empty body becomes an empty object; non-JSON bodies stay available as
/// a raw string instead of failing the call.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn classify_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_connect() {
        GatewayError::ConnectionRefused
    } else {
        GatewayError::Transport(err)
    }
}
