//! End-to-end dispatch tests against a local stub upstream.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::models::{
    CircuitState, CreateIntegrationRequest, Integration, IntegrationConfig, RequestLogQuery,
    ResponseClass,
};
use domain::store::GatewayStore;
use gateway::{Gateway, GatewayConfig, GatewayError, RequestBody, RequestOptions};
use persistence::MemoryStore;

/// Starts the stub upstream on an ephemeral port. Returns its base URL
/// and a hit counter for the `/fail` route.
async fn spawn_stub() -> (String, Arc<AtomicUsize>) {
    let fail_hits = Arc::new(AtomicUsize::new(0));
    let fail_hits_handler = fail_hits.clone();

    let app = Router::new()
        .route("/ok", get(|| async { Json(json!({"ok": true, "plan": "pro"})) }))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "no such resource"}))) }),
        )
        .route(
            "/fail",
            get(move || {
                let hits = fail_hits_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "late"
            }),
        )
        .route("/text", get(|| async { "hello world" }))
        .route("/empty", get(|| async { StatusCode::OK }))
        .route(
            "/echo",
            post(|headers: HeaderMap, body: String| async move {
                let mut map = serde_json::Map::new();
                for (name, value) in headers.iter() {
                    map.insert(
                        name.to_string(),
                        Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                    );
                }
                map.insert("body".to_string(), Value::String(body));
                Json(Value::Object(map))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    (format!("http://{}", addr), fail_hits)
}

struct Harness {
    gateway: Gateway,
    store: Arc<MemoryStore>,
    base_url: String,
    fail_hits: Arc<AtomicUsize>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = GatewayConfig::load_for_test(&[]).expect("test config");
        let gateway = Gateway::new(store.clone(), &config).expect("gateway");
        let (base_url, fail_hits) = spawn_stub().await;
        Self {
            gateway,
            store,
            base_url,
            fail_hits,
        }
    }

    async fn register_integration(&self) -> Integration {
        self.gateway
            .registry
            .create(CreateIntegrationRequest {
                name: "stub".to_string(),
                category: "test".to_string(),
                base_url: self.base_url.clone(),
                active: true,
                config: IntegrationConfig::default(),
            })
            .await
            .expect("register integration")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[tokio::test]
async fn test_successful_dispatch_writes_sanitized_audit_entry() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    let mut options = RequestOptions::for_integration(integration.id);
    options.headers = vec![(
        "Authorization".to_string(),
        "Bearer sk_live_4242".to_string(),
    )];

    let response = harness
        .gateway
        .dispatcher
        .get(&harness.url("/ok"), options)
        .await
        .expect("dispatch");

    assert_eq!(response.status, 200);
    assert_eq!(response.body["ok"], json!(true));
    assert_eq!(response.require_body().unwrap()["plan"], json!("pro"));

    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .expect("audit query");
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.method, "GET");
    assert_eq!(entry.endpoint, "/ok");
    assert_eq!(entry.response_status, Some(200));
    assert_eq!(entry.request_id, response.request_id);
    assert_eq!(entry.response_class(), ResponseClass::Success);
    assert!(entry.duration_ms.is_some());
    // The bearer token is masked, never stored.
    assert_eq!(entry.request_headers["Authorization"], json!("Bear***"));
}

#[tokio::test]
async fn test_http_error_is_classified_and_audited() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    let err = harness
        .gateway
        .dispatcher
        .get(
            &harness.url("/missing"),
            RequestOptions::for_integration(integration.id),
        )
        .await
        .expect_err("expected http error");

    match &err {
        GatewayError::Http { status, body } => {
            assert_eq!(*status, 404);
            assert_eq!(body["error"], json!("no such resource"));
        }
        other => panic!("expected http error, got {:?}", other),
    }
    assert_eq!(err.kind(), "http_error");

    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response_status, Some(404));
    assert_eq!(entries[0].response_class(), ResponseClass::ClientError);

    // A 4xx counts toward the breaker threshold.
    let state = harness.gateway.breaker.get_state(integration.id).await.unwrap();
    assert_eq!(state.failure_count, 1);
    assert_eq!(state.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_non_json_success_keeps_raw_body() {
    let harness = Harness::new().await;

    let response = harness
        .gateway
        .dispatcher
        .get(&harness.url("/text"), RequestOptions::default())
        .await
        .expect("dispatch");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, Value::String("hello world".to_string()));
}

#[tokio::test]
async fn test_empty_body_becomes_empty_object() {
    let harness = Harness::new().await;

    let response = harness
        .gateway
        .dispatcher
        .get(&harness.url("/empty"), RequestOptions::default())
        .await
        .expect("dispatch");

    assert_eq!(response.body, json!({}));
    assert!(matches!(
        response.require_body(),
        Err(GatewayError::EmptyResponse)
    ));
}

#[tokio::test]
async fn test_timeout_is_classified_and_audited() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    let mut options = RequestOptions::for_integration(integration.id);
    options.timeout = Some(Duration::from_millis(100));

    let err = harness
        .gateway
        .dispatcher
        .get(&harness.url("/slow"), options)
        .await
        .expect_err("expected timeout");
    assert_eq!(err.kind(), "timeout");

    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response_status, None);
    assert_eq!(
        entries[0].error_message.as_deref(),
        Some("Request timed out")
    );
    assert_eq!(entries[0].response_class(), ResponseClass::Error);
}

#[tokio::test]
async fn test_connection_refused_classification() {
    let harness = Harness::new().await;

    // Grab an ephemeral port and release it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let err = harness
        .gateway
        .dispatcher
        .get(
            &format!("http://{}/ok", dead_addr),
            RequestOptions::default(),
        )
        .await
        .expect_err("expected connection failure");
    assert_eq!(err.kind(), "connection_refused");
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_and_denies_without_io() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    for _ in 0..5 {
        let err = harness
            .gateway
            .dispatcher
            .get(
                &harness.url("/fail"),
                RequestOptions::for_integration(integration.id),
            )
            .await
            .expect_err("expected http error");
        assert_eq!(err.kind(), "http_error");
    }
    assert_eq!(harness.fail_hits.load(Ordering::SeqCst), 5);

    let state = harness.gateway.breaker.get_state(integration.id).await.unwrap();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.failure_count, 5);

    // The sixth call is denied before any network I/O.
    let err = harness
        .gateway
        .dispatcher
        .get(
            &harness.url("/fail"),
            RequestOptions::for_integration(integration.id),
        )
        .await
        .expect_err("expected denial");
    match err {
        GatewayError::CircuitOpen { retry_in_secs } => {
            assert!(retry_in_secs > 0 && retry_in_secs <= 60);
            assert!(err
                .to_string()
                .starts_with("Circuit breaker is open. Retry in"));
        }
        other => panic!("expected circuit open, got {:?}", other),
    }
    assert_eq!(harness.fail_hits.load(Ordering::SeqCst), 5);

    // Denials are not audited; only the five attempts are.
    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
}

#[tokio::test]
async fn test_probe_after_deadline_recovers_the_circuit() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    for _ in 0..5 {
        let _ = harness
            .gateway
            .dispatcher
            .get(
                &harness.url("/fail"),
                RequestOptions::for_integration(integration.id),
            )
            .await;
    }

    // Rewind the retry deadline as if the open window had elapsed.
    let past = chrono::Utc::now() - chrono::Duration::seconds(1);
    harness
        .store
        .update_circuit_state(integration.id, &move |state| {
            state.next_retry_at = Some(past);
            true
        })
        .await
        .unwrap();

    let response = harness
        .gateway
        .dispatcher
        .get(
            &harness.url("/ok"),
            RequestOptions::for_integration(integration.id),
        )
        .await
        .expect("probe should pass and succeed");
    assert_eq!(response.status, 200);

    let state = harness.gateway.breaker.get_state(integration.id).await.unwrap();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failure_count, 0);
    assert!(state.next_retry_at.is_none());
}

#[tokio::test]
async fn test_header_merge_reaches_the_wire() {
    let harness = Harness::new().await;

    let mut options = RequestOptions::default();
    options.headers = vec![("content-type".to_string(), "text/xml".to_string())];

    let response = harness
        .gateway
        .dispatcher
        .post(
            &harness.url("/echo"),
            Some(RequestBody::Text("<ping/>".to_string())),
            options,
        )
        .await
        .expect("dispatch");

    // Caller override wins; untouched defaults still apply.
    assert_eq!(response.body["content-type"], json!("text/xml"));
    assert_eq!(response.body["accept"], json!("application/json"));
    assert!(response.body["user-agent"]
        .as_str()
        .unwrap()
        .starts_with("outbound-gateway/"));
    assert_eq!(response.body["body"], json!("<ping/>"));
}

#[tokio::test]
async fn test_json_body_is_encoded() {
    let harness = Harness::new().await;

    let response = harness
        .gateway
        .dispatcher
        .post(
            &harness.url("/echo"),
            Some(RequestBody::Json(json!({"amount": 1200}))),
            RequestOptions::default(),
        )
        .await
        .expect("dispatch");

    assert_eq!(response.body["content-type"], json!("application/json"));
    assert_eq!(response.body["body"], json!(r#"{"amount":1200}"#));
}

#[tokio::test]
async fn test_dispatch_without_integration_skips_audit() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    harness
        .gateway
        .dispatcher
        .get(&harness.url("/ok"), RequestOptions::default())
        .await
        .expect("dispatch");

    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_invalid_url_rejected_before_io() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    let err = harness
        .gateway
        .dispatcher
        .get("not a url", RequestOptions::for_integration(integration.id))
        .await
        .expect_err("expected invalid params");
    assert_eq!(err.kind(), "invalid_params");

    let err = harness
        .gateway
        .dispatcher
        .get(
            "ftp://example.com/file",
            RequestOptions::for_integration(integration.id),
        )
        .await
        .expect_err("expected invalid params");
    assert_eq!(err.kind(), "invalid_params");

    let entries = harness
        .gateway
        .audit
        .query(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_audit_stats_over_mixed_outcomes() {
    let harness = Harness::new().await;
    let integration = harness.register_integration().await;

    for path in ["/ok", "/ok", "/missing"] {
        let _ = harness
            .gateway
            .dispatcher
            .get(
                &harness.url(path),
                RequestOptions::for_integration(integration.id),
            )
            .await;
    }

    let stats = harness
        .gateway
        .audit
        .stats(&RequestLogQuery::for_integration(integration.id))
        .await
        .unwrap();
    assert_eq!(stats.total, 3);
    assert!((stats.error_rate_pct - 33.333).abs() < 0.01);
    assert!(stats.by_status.contains(&(Some(200), 2)));
    assert!(stats.by_status.contains(&(Some(404), 1)));
    assert_eq!(stats.by_method, vec![("GET".to_string(), 3)]);
}
