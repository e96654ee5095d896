//! 401 refresh-and-retry over real HTTP, using `wiremock` to pin the exact
//! headers and bodies of every attempt.

use std::sync::Arc;

use serde_json::json;
use wheel_core::{
    AuthenticationResponse, ClientError, Endpoint, ExecutorConfig, HttpTokenRefresher,
    InMemoryTokenStore, LoginMethod, ReqwestTransport, RequestExecutor, TokenStore,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn logged_in_store() -> Arc<InMemoryTokenStore> {
    Arc::new(InMemoryTokenStore::with_tokens(AuthenticationResponse {
        access_token: "old-access".to_string(),
        refresh_token: "old-refresh".to_string(),
        provider: LoginMethod::Email,
    }))
}

fn executor(server: &MockServer, store: Arc<InMemoryTokenStore>) -> RequestExecutor {
    let transport = Arc::new(ReqwestTransport::default());
    let refresher = Arc::new(HttpTokenRefresher::new(
        transport.clone(),
        store.clone(),
        server.uri(),
        "/auth/refresh",
    ));
    RequestExecutor::new(transport, store, refresher)
        .with_config(ExecutorConfig::default().with_header("X-Client", "wheel-tests"))
}

#[derive(Debug, serde::Deserialize)]
struct Profile {
    email: String,
}

#[tokio::test]
async fn retries_with_refreshed_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "old-refresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "new-access",
            "refreshToken": "new-refresh",
            "provider": "email"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer new-access"))
        .and(header("x-client", "wheel-tests"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@example.com"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let profile: Profile = executor(&server, store.clone())
        .execute(true, &Endpoint::get(server.uri(), "/profile"))
        .await
        .unwrap();

    assert_eq!(profile.email, "a@example.com");
    assert_eq!(store.access_token().as_deref(), Some("new-access"));
    assert_eq!(store.refresh_token().as_deref(), Some("new-refresh"));
}

#[tokio::test]
async fn failed_refresh_wipes_tokens_and_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid refresh token"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let mut wiped = store.tokens_wiped();
    let err = executor(&server, store.clone())
        .execute_empty(true, &Endpoint::get(server.uri(), "/profile"))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert!(store.access_token().is_none());
    assert!(wiped.try_recv().is_ok());
}

#[tokio::test]
async fn persistent_401_stops_after_one_retry() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/current"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "a2",
            "refreshToken": "r2",
            "provider": "google"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store();
    let descriptor = Endpoint::new(wheel_core::HttpMethod::Delete, server.uri(), "/sessions/current");
    let err = executor(&server, store.clone())
        .execute_empty(true, &descriptor)
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(store.last_login_method(), Some(LoginMethod::Google));
}

#[tokio::test]
async fn get_parameters_reach_the_server_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let results: Vec<serde_json::Value> = executor(&server, logged_in_store())
        .execute(
            false,
            &Endpoint::get(server.uri(), "/search").param("q", "rust").param("limit", 10),
        )
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn domain_error_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_json(json!({"prompt": "hi"})))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": "daily limit reached",
            "domainCode": 4
        })))
        .mount(&server)
        .await;

    let err = executor(&server, logged_in_store())
        .execute_empty(true, &Endpoint::post(server.uri(), "/generate").param("prompt", "hi"))
        .await
        .unwrap_err();

    match err {
        ClientError::Api {
            message,
            status,
            domain_code,
        } => {
            assert_eq!(message, "daily limit reached");
            assert_eq!(status, 429);
            assert_eq!(domain_code, Some(wheel_core::DomainErrorCode::DailyFreeUsageExceeded));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}
