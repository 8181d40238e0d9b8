//! Integration tests for `IquaClient` using wiremock.
//!
//! These tests mock the myIQua API to verify the login/fetch sequence,
//! the single re-authentication retry on 401, and error classification:
//!
//! - POST /auth/login: login
//! - GET  /devices/{id}/detail-or-summary: device data

use std::time::Duration;

use iqua_core::api::{ApiError, IquaClient, Timeouts};
use iqua_core::auth::Credentials;
use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PATH: &str = "/auth/login";
const DATA_PATH: &str = "/devices/dev-1/detail-or-summary";

/// Helper: creates a client pointed at the given wiremock server.
fn mock_client(server: &MockServer) -> IquaClient {
    IquaClient::new(
        reqwest::Client::new(),
        Credentials::new("me@example.com", "secret", "dev-1"),
    )
    .with_base_url(server.uri())
}

fn device_payload() -> serde_json::Value {
    json!({
        "device": {
            "properties": {
                "gallons_used_today": {
                    "converted_value": 42,
                    "updated_at": "2024-05-01T12:30:00Z"
                }
            }
        }
    })
}

fn login_ok(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "token_type": "bearer"
    }))
}

async fn requests_to(server: &MockServer, verb: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .count()
}

// ── happy path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn first_call_logs_in_before_fetching() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_json(json!({"email": "me@example.com", "password": "secret"})))
        .respond_with(login_ok("tok-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .and(header("authorization", "Bearer tok-1"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let snapshot = client.get_device_data().await.unwrap();

    assert_eq!(snapshot.payload(), &device_payload());
    assert_eq!(client.session().token(), Some("tok-1"));
    assert_eq!(client.session().logins(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method.as_str(), "POST", "login must come first");
    assert_eq!(requests[1].method.as_str(), "GET");
}

#[tokio::test]
async fn held_token_is_reused_across_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    client.get_device_data().await.unwrap();
    client.get_device_data().await.unwrap();

    assert_eq!(client.session().logins(), 1);
}

// ── re-authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn expired_token_is_replaced_once_and_fetch_retried() {
    let server = MockServer::start().await;

    // First login hands out tok-1, every later one tok-2
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok-2"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let snapshot = client.get_device_data().await.unwrap();

    assert_eq!(snapshot.payload(), &device_payload());
    assert_eq!(client.session().token(), Some("tok-2"));
    assert_eq!(client.session().logins(), 2, "token reacquired exactly once");
}

#[tokio::test]
async fn second_401_is_auth_error_without_third_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    assert!(err.is_auth(), "expected auth error, got {:?}", err);
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(client.session().token().is_none());
}

#[tokio::test]
async fn call_after_unrecoverable_token_logs_in_again() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    assert!(client.get_device_data().await.unwrap_err().is_auth());
    client.get_device_data().await.unwrap();

    assert_eq!(client.session().logins(), 3);
    assert_eq!(requests_to(&server, "GET", DATA_PATH).await, 3);
}

// ── login failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_login_never_calls_data_endpoint() {
    for status in [401u16, 403] {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("bad credentials"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = mock_client(&server);
        let err = client.get_device_data().await.unwrap_err();

        match &err {
            ApiError::Auth { status: got, message } => {
                assert_eq!(got.as_u16(), status);
                assert!(message.contains("bad credentials"));
            }
            other => panic!("expected Auth for login {}, got {:?}", status, other),
        }
        assert!(client.session().token().is_none());
    }
}

#[tokio::test]
async fn login_server_error_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(requests_to(&server, "GET", DATA_PATH).await, 0);
}

#[tokio::test]
async fn login_without_token_is_payload_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    assert!(matches!(err, ApiError::PayloadShape(_)), "got {:?}", err);
    assert_eq!(requests_to(&server, "GET", DATA_PATH).await, 0);
}

// ── fetch failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn server_error_is_http_error_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal oops"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    match &err {
        ApiError::Http { status, body } => {
            assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "internal oops");
        }
        other => panic!("expected Http, got {:?}", other),
    }
    // A non-auth failure does not cost us the token
    assert_eq!(client.session().token(), Some("tok"));
}

#[tokio::test]
async fn forbidden_fetch_does_not_reauthenticate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    assert!(
        matches!(err, ApiError::Http { status, .. } if status == StatusCode::FORBIDDEN),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn fetch_timeout_is_network_error_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(device_payload())
                .set_delay(Duration::from_secs(5)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server).with_timeouts(Timeouts {
        login: Duration::from_secs(5),
        fetch: Duration::from_millis(200),
    });
    let err = client.get_device_data().await.unwrap_err();

    match &err {
        ApiError::Network(e) => assert!(e.is_timeout(), "expected timeout, got {:?}", e),
        other => panic!("expected Network, got {:?}", other),
    }
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    // Nothing listens on port 1
    let mut client = IquaClient::new(
        reqwest::Client::new(),
        Credentials::new("me@example.com", "secret", "dev-1"),
    )
    .with_base_url("http://127.0.0.1:1");

    let err = client.get_device_data().await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    assert!(err.is_transient());
}

#[tokio::test]
async fn non_json_body_is_payload_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_ok("tok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = mock_client(&server);
    let err = client.get_device_data().await.unwrap_err();

    assert!(matches!(err, ApiError::PayloadShape(_)), "got {:?}", err);
}

// ── bounds ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn attempts_are_bounded_for_every_outcome_sequence() {
    let outcomes: [&[u16]; 5] = [&[200], &[401, 200], &[401, 401], &[500], &[401, 500]];

    for sequence in outcomes {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(login_ok("tok"))
            .mount(&server)
            .await;
        for status in sequence {
            Mock::given(method("GET"))
                .and(path(DATA_PATH))
                .respond_with(ResponseTemplate::new(*status).set_body_json(device_payload()))
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        // Anything past the scripted sequence would be a third attempt
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_payload()))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = mock_client(&server);
        let _ = client.get_device_data().await;

        let logins = requests_to(&server, "POST", LOGIN_PATH).await;
        let fetches = requests_to(&server, "GET", DATA_PATH).await;
        assert!(logins <= 2, "{:?}: {} logins", sequence, logins);
        assert!(fetches <= 2, "{:?}: {} fetches", sequence, fetches);
        assert_eq!(fetches, sequence.len(), "{:?}", sequence);
    }
}
