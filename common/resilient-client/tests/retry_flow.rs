use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use common_resilient_client::{
    ClientError, FixedJitter, OutboundRequest, ResilientClient, ResponseBody, RetryConfig, Sleeper,
};
use httpmock::prelude::*;
use prometheus::{IntCounterVec, Opts};
use serde::Deserialize;
use serde_json::json;

/// Records requested waits instead of sleeping.
#[derive(Clone, Default)]
struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

#[derive(Clone)]
struct Scripted {
    status: u16,
    retry_after: Option<&'static str>,
    body: &'static str,
}

fn scripted(status: u16, body: &'static str) -> Scripted {
    Scripted { status, retry_after: None, body }
}

struct Script {
    steps: Vec<Scripted>,
    hits: AtomicUsize,
}

async fn scripted_handler(State(script): State<Arc<Script>>) -> Response {
    let n = script.hits.fetch_add(1, Ordering::SeqCst);
    let step = script
        .steps
        .get(n)
        .or_else(|| script.steps.last())
        .cloned()
        .unwrap();
    let mut resp = (StatusCode::from_u16(step.status).unwrap(), step.body).into_response();
    if let Some(value) = step.retry_after {
        resp.headers_mut()
            .insert("Retry-After", HeaderValue::from_static(value));
    }
    resp
}

/// Serves the scripted responses in order, repeating the last one.
async fn spawn_script(steps: Vec<Scripted>) -> (String, Arc<Script>) {
    let script = Arc::new(Script { steps, hits: AtomicUsize::new(0) });
    let app = Router::new()
        .route("/resource", any(scripted_handler))
        .with_state(script.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/resource"), script)
}

fn client(config: RetryConfig, sleeper: &RecordingSleeper) -> ResilientClient {
    ResilientClient::new(config)
        .with_sleeper(Arc::new(sleeper.clone()))
        .with_jitter(Arc::new(FixedJitter(1.0)))
}

#[tokio::test]
async fn two_rate_limits_then_success_issues_three_requests() {
    let (url, script) = spawn_script(vec![
        scripted(429, ""),
        scripted(429, ""),
        scripted(200, r#"{"ok":true}"#),
    ])
    .await;
    let sleeper = RecordingSleeper::default();
    let config = RetryConfig::new().with_max_retries(2).with_initial_backoff_ms(100);

    let body = client(config, &sleeper)
        .execute(&OutboundRequest::get(url))
        .await
        .expect("third attempt succeeds");

    assert_eq!(body, ResponseBody::Json(json!({ "ok": true })));
    assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn server_error_fails_immediately_without_retry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/boom");
            then.status(500).body("database on fire");
        })
        .await;
    let sleeper = RecordingSleeper::default();

    let err = client(RetryConfig::default(), &sleeper)
        .execute(&OutboundRequest::get(server.url("/boom")))
        .await
        .expect_err("500 is terminal");

    mock.assert_hits_async(1).await;
    assert!(sleeper.waits().is_empty());
    match err {
        ClientError::Http { status, status_text, body } => {
            assert_eq!(status, 500);
            assert_eq!(status_text, "Internal Server Error");
            assert_eq!(body, "database on fire");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(404).body("no such route");
        })
        .await;
    let sleeper = RecordingSleeper::default();
    let request = OutboundRequest::post(server.url("/auth/login"))
        .with_json(&json!({ "email": "a@b.c" }))
        .unwrap();

    let err = client(RetryConfig::default(), &sleeper)
        .execute(&request)
        .await
        .expect_err("404 is terminal");

    mock.assert_hits_async(1).await;
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn persistent_rate_limit_exhausts_budget() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/limited");
            then.status(429);
        })
        .await;
    let sleeper = RecordingSleeper::default();
    let config = RetryConfig::new().with_max_retries(3).with_initial_backoff_ms(10);

    let err = client(config, &sleeper)
        .execute(&OutboundRequest::get(server.url("/limited")))
        .await
        .expect_err("429 forever");

    mock.assert_hits_async(4).await;
    assert!(matches!(err, ClientError::RateLimitExceeded { attempts: 4 }));
    assert_eq!(
        sleeper.waits(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40)
        ]
    );
}

#[tokio::test]
async fn retry_after_header_takes_precedence() {
    let (url, script) = spawn_script(vec![
        Scripted { status: 429, retry_after: Some("2"), body: "" },
        scripted(200, "done"),
    ])
    .await;
    let sleeper = RecordingSleeper::default();
    let config = RetryConfig::new().with_initial_backoff_ms(50).with_parse_json(false);

    let body = client(config, &sleeper)
        .execute(&OutboundRequest::get(url))
        .await
        .unwrap();

    assert_eq!(body.into_text().as_deref(), Some("done"));
    assert_eq!(script.hits.load(Ordering::SeqCst), 2);
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(2_000)]);
}

#[tokio::test]
async fn backoff_is_capped_at_maximum() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/limited");
            then.status(429);
        })
        .await;
    let sleeper = RecordingSleeper::default();
    let config = RetryConfig::new()
        .with_max_retries(5)
        .with_initial_backoff_ms(1_000)
        .with_max_backoff_ms(3_000);
    let client = ResilientClient::new(config)
        .with_sleeper(Arc::new(sleeper.clone()))
        .with_jitter(Arc::new(FixedJitter(1.09)));

    let _ = client.execute(&OutboundRequest::get(server.url("/limited"))).await;

    let waits: Vec<u128> = sleeper.waits().iter().map(Duration::as_millis).collect();
    assert_eq!(waits, vec![1_000, 2_180, 3_000, 3_000, 3_000]);
}

#[tokio::test]
async fn transport_failures_retry_with_plain_doubling() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let sleeper = RecordingSleeper::default();
    let config = RetryConfig::new().with_max_retries(2).with_initial_backoff_ms(50);
    let client = ResilientClient::new(config)
        .with_sleeper(Arc::new(sleeper.clone()))
        .with_jitter(Arc::new(FixedJitter(0.9)));

    let err = client
        .execute(&OutboundRequest::get(format!("http://127.0.0.1:{port}/down")))
        .await
        .expect_err("nothing listens on the port");

    assert!(matches!(err, ClientError::Network { attempts: 3, .. }));
    assert!(err.is_transient());
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_millis(50), Duration::from_millis(100)]
    );
}

#[tokio::test]
async fn typed_json_and_decode_failures() {
    #[derive(Debug, Deserialize)]
    struct Profile {
        id: String,
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users/me").header("authorization", "Bearer tkn");
            then.status(200).json_body(json!({ "id": "user-1" }));
        })
        .await;
    let garbage = server
        .mock_async(|when, then| {
            when.method(GET).path("/garbage");
            then.status(200).body("<html>");
        })
        .await;
    let sleeper = RecordingSleeper::default();
    let client = client(RetryConfig::default(), &sleeper);

    let request = OutboundRequest::get(server.url("/users/me")).with_bearer("tkn").unwrap();
    let profile: Profile = client.execute_json(&request).await.unwrap();
    assert_eq!(profile.id, "user-1");

    let err = client
        .execute(&OutboundRequest::get(server.url("/garbage")))
        .await
        .expect_err("html is not json");
    assert!(matches!(err, ClientError::Decode(_)));
    garbage.assert_hits_async(1).await;
}

#[tokio::test]
async fn retries_are_counted_by_reason() {
    let (url, _script) = spawn_script(vec![
        scripted(429, ""),
        scripted(429, ""),
        scripted(204, ""),
    ])
    .await;
    let counter = IntCounterVec::new(
        Opts::new("outbound_retries_total", "Outbound retries"),
        &["reason"],
    )
    .unwrap();
    let sleeper = RecordingSleeper::default();
    let client = client(RetryConfig::new().with_initial_backoff_ms(1), &sleeper)
        .with_retry_counter(counter.clone());

    let body = client.execute(&OutboundRequest::get(url)).await.unwrap();

    assert_eq!(body, ResponseBody::Json(serde_json::Value::Null));
    assert_eq!(counter.with_label_values(&["rate_limited"]).get(), 2);
    assert_eq!(counter.with_label_values(&["network"]).get(), 0);
}
