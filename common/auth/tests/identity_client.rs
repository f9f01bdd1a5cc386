use axum::response::IntoResponse;
use axum::http::StatusCode;
use common_auth::{AuthError, IdentityClient, IdentityConfig, IdentityEnvironment, RegistrationRequest};
use common_resilient_client::{ClientError, RetryConfig};
use httpmock::prelude::*;
use serde_json::json;

fn client(server: &MockServer, max_retries: u32) -> IdentityClient {
    let retry = RetryConfig::new()
        .with_max_retries(max_retries)
        .with_initial_backoff_ms(1)
        .with_max_backoff_ms(5);
    IdentityClient::new(IdentityConfig::new(IdentityEnvironment::Development, server.base_url()).with_retry(retry))
}

#[tokio::test]
async fn validate_token_resolves_user() {
    let server = MockServer::start_async().await;
    let mock = server.mock_async(|when, then| {
        when.method(POST).path("/auth/validate").header("authorization", "Bearer tok-1");
        then.status(200).json_body(json!({ "valid": true, "user": { "id": "user-7", "email": "sam@example.com" } }));
    }).await;

    let user = client(&server, 2).validate_token("tok-1").await.expect("valid token");

    mock.assert_hits_async(1).await;
    assert_eq!(user.id, "user-7");
    assert_eq!(user.email.as_deref(), Some("sam@example.com"));
}

#[tokio::test]
async fn rejected_token_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server.mock_async(|when, then| {
        when.method(POST).path("/auth/validate");
        then.status(401).json_body(json!({ "error": "expired" }));
    }).await;

    let err = client(&server, 5).validate_token("expired").await.expect_err("401");

    mock.assert_hits_async(1).await;
    assert!(matches!(err, AuthError::InvalidToken));
    assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_outage_maps_to_service_unavailable() {
    let server = MockServer::start_async().await;
    let mock = server.mock_async(|when, then| {
        when.method(POST).path("/auth/validate");
        then.status(503).body("maintenance");
    }).await;

    let err = client(&server, 5).validate_token("tok").await.expect_err("503");

    mock.assert_hits_async(1).await;
    assert!(matches!(err, AuthError::Identity(ClientError::Http { status: 503, .. })));
    assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn rate_limited_validation_uses_retry_budget() {
    let server = MockServer::start_async().await;
    let mock = server.mock_async(|when, then| {
        when.method(POST).path("/auth/validate");
        then.status(429).header("Retry-After", "0");
    }).await;

    let err = client(&server, 1).validate_token("tok").await.expect_err("429");

    mock.assert_hits_async(2).await;
    assert!(matches!(err, AuthError::Identity(ClientError::RateLimitExceeded { attempts: 2 })));
}

#[tokio::test]
async fn account_endpoints_pass_json_through() {
    let server = MockServer::start_async().await;
    let login = server.mock_async(|when, then| {
        when.method(POST).path("/auth/login").json_body(json!({ "email": "sam@example.com", "password": "pw" }));
        then.status(200).json_body(json!({ "accessToken": "a", "refreshToken": "r" }));
    }).await;
    let register = server.mock_async(|when, then| {
        when.method(POST).path("/auth/register").json_body(json!({ "email": "new@example.com", "password": "pw" }));
        then.status(201).json_body(json!({ "id": "user-9" }));
    }).await;
    let refresh = server.mock_async(|when, then| {
        when.method(POST).path("/auth/refresh").json_body(json!({ "refreshToken": "r" }));
        then.status(200).json_body(json!({ "accessToken": "b" }));
    }).await;
    let reset = server.mock_async(|when, then| {
        when.method(POST).path("/auth/password-reset");
        then.status(200).json_body(json!({ "sent": true }));
    }).await;
    let profile = server.mock_async(|when, then| {
        when.method(GET).path("/users/me").header("authorization", "Bearer a");
        then.status(200).json_body(json!({ "id": "user-1", "username": "sam" }));
    }).await;
    let subscription = server.mock_async(|when, then| {
        when.method(GET).path("/users/me/subscription").header("authorization", "Bearer a");
        then.status(200).json_body(json!({ "plan": "free" }));
    }).await;
    let identity = client(&server, 0);

    let tokens = identity.login("sam@example.com", "pw").await.unwrap();
    assert_eq!(tokens["accessToken"], "a");
    let created = identity
        .register(&RegistrationRequest { email: "new@example.com".into(), password: "pw".into(), username: None })
        .await
        .unwrap();
    assert_eq!(created["id"], "user-9");
    assert_eq!(identity.refresh_token("r").await.unwrap()["accessToken"], "b");
    assert_eq!(identity.request_password_reset("sam@example.com").await.unwrap()["sent"], true);
    assert_eq!(identity.user_profile("a").await.unwrap()["username"], "sam");
    assert_eq!(identity.subscription("a").await.unwrap()["plan"], "free");

    for mock in [&login, &register, &refresh, &reset, &profile, &subscription] {
        mock.assert_hits_async(1).await;
    }
}
