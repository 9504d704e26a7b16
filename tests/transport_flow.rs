//! Integration tests for the transport core using wiremock.
//!
//! These tests mock the Sophos Central API to verify the request
//! lifecycle in `SophosClient::request`:
//!
//! - bounded retry with backoff on transient statuses (idempotent only)
//! - `Retry-After` handling on 429
//! - one-shot token refresh on 401
//! - status classification into `SophosError` variants
//! - connectivity failures and empty success bodies
//!
//! Clients use a zero-delay retry policy so the suite runs fast, except
//! where a test needs a real delay to tell two waits apart.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use sophos_central::auth::{Token, TokenProvider};
use sophos_central::client::{RetryPolicy, SophosClient};
use sophos_central::config::Credentials;
use sophos_central::error::SophosError;
use sophos_central::query::QueryParams;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Retry policy with the given budget and no sleeping.
fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

/// Helper: a client with a pre-set token pointed at the wiremock server.
fn mock_client(server: &MockServer, max_retries: u32) -> SophosClient {
    SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&server.uri())
        .retry_policy(fast_retry(max_retries))
        .build()
        .unwrap()
}

// ── Retry ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_recovers_after_transient_failures() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 3);

    // Three 503s, then success. Mocks registered first win while they
    // still match, so the 200 only answers the fourth request.
    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let body: Value = client.get("endpoint/v1/endpoints", None).await.unwrap();
    assert_eq!(body, json!({"items": []}));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 4, "one attempt plus three retries");
}

#[tokio::test]
async fn get_gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 3);

    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "unavailable",
            "message": "Service unavailable",
            "correlationId": "corr-503"
        })))
        .expect(4)
        .mount(&server)
        .await;

    let err = client
        .get::<Value>("endpoint/v1/endpoints", None)
        .await
        .unwrap_err();

    match &err {
        SophosError::Server { details, attempts } => {
            assert_eq!(*attempts, 4);
            assert_eq!(details.status.as_u16(), 503);
            assert_eq!(details.correlation_id.as_deref(), Some("corr-503"));
        }
        other => panic!("expected Server error, got {other:?}"),
    }
    assert!(err.to_string().contains("corr-503"));
}

#[tokio::test]
async fn post_is_never_retried() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 3);

    // A retried POST could start a second scan; exactly one attempt.
    Mock::given(method("POST"))
        .and(path("/endpoint/v1/endpoints/ep-1/scans"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .post::<_, Value>("endpoint/v1/endpoints/ep-1/scans", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SophosError::Server { attempts: 1, .. }), "got {err:?}");
}

#[tokio::test]
async fn rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    // Computed backoff would sleep five seconds; the server says zero.
    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&server.uri())
        .retry_policy(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        })
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let started = Instant::now();
    let body: Value = client.get("common/v1/alerts", None).await.unwrap();
    assert_eq!(body["items"], json!([]));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "Retry-After: 0 should replace the computed delay, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn retry_after_beyond_max_delay_is_surfaced() {
    let server = MockServer::start().await;
    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&server.uri())
        .retry_policy(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        })
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "86400"))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let err = client
        .get::<Value>("common/v1/alerts", None)
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(86400)));
    assert!(matches!(err, SophosError::RateLimited { .. }), "got {err:?}");
}

#[tokio::test]
async fn rate_limit_surfaces_when_retry_disabled() {
    let server = MockServer::start().await;
    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&server.uri())
        .retry_policy(RetryPolicy {
            rate_limit_retry: false,
            ..fast_retry(3)
        })
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .get::<Value>("common/v1/alerts", None)
        .await
        .unwrap_err();
    match err {
        SophosError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

// ── 401 refresh ────────────────────────────────────────────────────────

/// Client whose cached token is `stale` and whose token endpoint lives on
/// the mock server.
fn refreshing_client(server: &MockServer) -> SophosClient {
    let provider = TokenProvider::new(Credentials::new("cid", "secret"))
        .with_cached_token(Token::new("stale", "bearer", Duration::from_secs(3600)))
        .with_endpoints(
            &format!("{}/api/v2/oauth2/token", server.uri()),
            &format!("{}/whoami/v1", server.uri()),
        );
    SophosClient::builder(provider)
        .base_url(&server.uri())
        .retry_policy(fast_retry(0))
        .build()
        .unwrap()
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn unauthorized_refreshes_token_once_and_retries() {
    let server = MockServer::start().await;
    let client = refreshing_client(&server);
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints/ep-1"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints/ep-1"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ep-1"})))
        .expect(1)
        .mount(&server)
        .await;

    // retry budget is zero: the refresh must not count as a retry.
    let body: Value = client.get("endpoint/v1/endpoints/ep-1", None).await.unwrap();
    assert_eq!(body["id"], "ep-1");
}

#[tokio::test]
async fn second_unauthorized_is_authentication_error() {
    let server = MockServer::start().await;
    let client = refreshing_client(&server);
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let err = client
        .get::<Value>("endpoint/v1/endpoints", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SophosError::Authentication { .. }), "got {err:?}");
}

// ── Classification ─────────────────────────────────────────────────────

#[tokio::test]
async fn forbidden_is_permission_error_with_correlation_id() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 3);

    Mock::given(method("GET"))
        .and(path("/partner/v1/tenants"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "forbidden",
            "message": "Caller is not a partner",
            "correlationId": "corr-403",
            "requestId": "req-403"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .get::<Value>("partner/v1/tenants", None)
        .await
        .unwrap_err();
    match &err {
        SophosError::Permission(details) => {
            assert_eq!(details.code.as_deref(), Some("forbidden"));
            assert_eq!(details.request_id.as_deref(), Some("req-403"));
        }
        other => panic!("expected Permission, got {other:?}"),
    }
    let line = err.to_string();
    assert!(line.contains("corr-403"), "{line}");
    assert!(!line.contains('\n'), "error must render on one line");
}

#[tokio::test]
async fn not_found_and_bad_request_are_classified() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 3);

    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "notFound",
            "message": "Endpoint not found"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/endpoint/v1/endpoints/ep-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad field"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .get::<Value>("endpoint/v1/endpoints/missing", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SophosError::NotFound(_)), "got {err:?}");

    let err = client
        .patch::<_, Value>("endpoint/v1/endpoints/ep-1", &json!({"bogus": 1}))
        .await
        .unwrap_err();
    match err {
        SophosError::Validation { details: Some(details), .. } => {
            assert_eq!(details.message, "bad field");
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_host_is_connectivity_error() {
    // Port 1 is reserved and nothing listens on it.
    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url("http://127.0.0.1:1")
        .retry_policy(fast_retry(1))
        .build()
        .unwrap();

    let err = client
        .get::<Value>("endpoint/v1/endpoints", None)
        .await
        .unwrap_err();
    match err {
        SophosError::Connectivity { message, .. } => {
            assert!(message.contains("2 attempt"), "{message}");
        }
        other => panic!("expected Connectivity, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_error_body_is_connectivity_error() {
    // A server that promises 100 bytes, sends a few, and hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\n{\"error\"")
            .await
            .unwrap();
    });

    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&format!("http://{addr}"))
        .retry_policy(RetryPolicy::none())
        .build()
        .unwrap();

    let err = client
        .get::<Value>("endpoint/v1/endpoints", None)
        .await
        .unwrap_err();
    match err {
        SophosError::Connectivity { message, .. } => {
            assert!(message.contains("failed to read response body"), "{message}");
        }
        other => panic!("expected Connectivity, got {other:?}"),
    }
}

// ── Request shaping ────────────────────────────────────────────────────

#[tokio::test]
async fn no_content_decodes_as_null() {
    let server = MockServer::start().await;
    let client = mock_client(&server, 0);

    Mock::given(method("DELETE"))
        .and(path("/endpoint/v1/endpoints/ep-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let body: Value = client.delete("endpoint/v1/endpoints/ep-1").await.unwrap();
    assert_eq!(body, Value::Null);
    client
        .delete::<()>("endpoint/v1/endpoints/ep-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn bearer_tenant_header_and_query_are_sent() {
    let server = MockServer::start().await;
    let client = SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&format!("{}/", server.uri()))
        .tenant_id("tenant-7")
        .retry_policy(fast_retry(0))
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/endpoint/v1/endpoints"))
        .and(header("Authorization", "Bearer mock-token"))
        .and(header("X-Tenant-ID", "tenant-7"))
        .and(query_param("pageSize", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut params = QueryParams::new();
    params.insert("pageSize".to_string(), "10".to_string());
    let _: Value = client
        .get("/endpoint/v1/endpoints", Some(&params))
        .await
        .unwrap();
}
