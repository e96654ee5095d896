//! Full session lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every executor path
//! over real HTTP with `ReqwestTransport`: login, authenticated calls, server
//! side token expiry followed by a transparent refresh-and-retry, domain
//! errors and malformed error bodies.

use std::collections::HashMap;
use std::sync::Arc;

use wheel_core::{
    AuthenticationResponse, ClientError, DomainErrorCode, Endpoint, ExecutorConfig, HttpMethod,
    HttpTokenRefresher, InMemoryTokenStore, LoginMethod, ReqwestTransport, RequestExecutor,
    TokenStore,
};

#[derive(Debug, serde::Deserialize)]
struct Profile {
    email: String,
    provider: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    refresh_count: usize,
}

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { mock_server::run(listener).await });
    format!("http://{addr}")
}

#[tokio::test]
async fn session_lifecycle() {
    // Step 1: start mock server and wire the executor.
    let base = start_server().await;
    let store = Arc::new(InMemoryTokenStore::new());
    let transport = Arc::new(ReqwestTransport::default());
    let refresher = Arc::new(HttpTokenRefresher::new(
        transport.clone(),
        store.clone(),
        base.as_str(),
        "/auth/refresh",
    ));
    let executor = RequestExecutor::new(transport, store.clone(), refresher)
        .with_config(ExecutorConfig::default().with_header("X-App-Version", "1.0.0"));

    // Step 2: authenticated call before login fails locally.
    let err = executor
        .execute_empty(true, &Endpoint::get(base.as_str(), "/profile"))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    // Step 3: login without authentication.
    let tokens: AuthenticationResponse = executor
        .execute(
            false,
            &Endpoint::post(base.as_str(), "/auth/login")
                .param("email", "dev@example.com")
                .param("provider", "google"),
        )
        .await
        .unwrap();
    assert_eq!(tokens.provider, LoginMethod::Google);
    let first_access = tokens.access_token.clone();
    store.save_tokens(tokens);

    // Step 4: authenticated profile.
    let profile: Profile = executor
        .execute_authenticated(&Endpoint::get(base.as_str(), "/profile"))
        .await
        .unwrap();
    assert_eq!(profile.email, "dev@example.com");
    assert_eq!(profile.provider, "google");

    // Step 5: headers seen by the server.
    let headers: HashMap<String, String> = executor
        .execute(true, &Endpoint::get(base.as_str(), "/headers"))
        .await
        .unwrap();
    assert_eq!(headers["authorization"], format!("Bearer {first_access}"));
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-app-version"], "1.0.0");

    // Step 6: expire access tokens server side.
    executor
        .execute_empty(false, &Endpoint::post(base.as_str(), "/auth/expire"))
        .await
        .unwrap();

    // Step 7: next call refreshes and retries transparently.
    let profile: Profile = executor
        .execute(true, &Endpoint::get(base.as_str(), "/profile"))
        .await
        .unwrap();
    assert_eq!(profile.email, "dev@example.com");
    assert_ne!(store.access_token().as_deref(), Some(first_access.as_str()));

    let stats: Stats = executor
        .execute(false, &Endpoint::get(base.as_str(), "/auth/stats"))
        .await
        .unwrap();
    assert_eq!(stats.refresh_count, 1);

    // Step 8: query and body encoding.
    let echoed: HashMap<String, String> = executor
        .execute(
            false,
            &Endpoint::new(HttpMethod::Delete, base.as_str(), "/echo")
                .param("id", 42)
                .param("force", true),
        )
        .await
        .unwrap();
    assert_eq!(echoed["id"], "42");
    assert_eq!(echoed["force"], "true");

    let echoed: serde_json::Value = executor
        .execute(
            true,
            &Endpoint::new(HttpMethod::Patch, base.as_str(), "/echo").param("title", "renamed"),
        )
        .await
        .unwrap();
    assert_eq!(echoed, serde_json::json!({"title": "renamed"}));

    // Step 9: domain error body.
    let err = executor
        .execute_empty(true, &Endpoint::get(base.as_str(), "/errors/500").param("domainCode", 3))
        .await
        .unwrap_err();
    match err {
        ClientError::Api {
            message,
            status,
            domain_code,
        } => {
            assert_eq!(message, "internal server error");
            assert_eq!(status, 500);
            assert_eq!(domain_code, Some(DomainErrorCode::AppRequiresUpdate));
        }
        other => panic!("expected Api error, got {other:?}"),
    }

    // Step 10: unknown domain code is dropped, not a parse failure.
    let err = executor
        .execute_empty(true, &Endpoint::get(base.as_str(), "/errors/403").param("domainCode", 99))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Api {
            status: 403,
            domain_code: None,
            ..
        }
    ));

    // Step 11: non-JSON error body.
    let err = executor
        .execute_empty(true, &Endpoint::get(base.as_str(), "/errors/404/raw"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidErrorBody));

    // Step 12: logout, then wipe locally; further authenticated calls fail
    // before reaching the network.
    executor
        .execute_empty(true, &Endpoint::new(HttpMethod::Delete, base.as_str(), "/profile"))
        .await
        .unwrap();
    store.wipe_tokens();
    let err = executor
        .execute_empty(true, &Endpoint::get(base.as_str(), "/profile"))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Arc::new(InMemoryTokenStore::new());
    let transport = Arc::new(ReqwestTransport::default());
    let refresher = Arc::new(HttpTokenRefresher::new(
        transport.clone(),
        store.clone(),
        format!("http://{addr}"),
        "/auth/refresh",
    ));
    let executor = RequestExecutor::new(transport, store, refresher);

    let err = executor
        .execute_empty(false, &Endpoint::get(format!("http://{addr}"), "/profile"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
