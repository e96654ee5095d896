//! Token storage and refresh collaborators.
//!
//! # Design
//! The executor reads tokens through `TokenStore` on every attempt and asks a
//! `TokenRefresher` for new ones after a 401. Both are traits so hosts can
//! plug in keychains, databases or other exchanges. Events (wipe, refresh
//! failure) are fire-and-forget `broadcast` notifications with no payload;
//! sending with no subscribers is not an error.
//!
//! `InMemoryTokenStore`, `HttpTokenRefresher` and `SingleFlightRefresher` are
//! the stock implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};

use crate::descriptor::{Endpoint, RequestDescriptor};
use crate::error::ClientError;
use crate::response::decode_json;
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 16;

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Google,
    Email,
}

/// Token pair issued by a login or refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub provider: LoginMethod,
}

/// Current credentials, shared between the executor and the refresher.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn save_tokens(&self, tokens: AuthenticationResponse);
    fn wipe_tokens(&self);

    /// Notified every time the tokens are wiped.
    fn tokens_wiped(&self) -> broadcast::Receiver<()>;
}

/// Performs the refresh exchange. On success the `TokenStore` holds new tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), ClientError>;

    /// Notified every time a refresh fails.
    fn refresh_failures(&self) -> broadcast::Receiver<()>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoredTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
    login_method: Option<LoginMethod>,
}

/// Process-local `TokenStore`. Nothing is persisted.
#[derive(Debug)]
pub struct InMemoryTokenStore {
    tokens: RwLock<StoredTokens>,
    wiped: broadcast::Sender<()>,
    logged_in: watch::Sender<bool>,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        let (wiped, _) = broadcast::channel(EVENT_CAPACITY);
        let (logged_in, _) = watch::channel(false);
        Self {
            tokens: RwLock::new(StoredTokens::default()),
            wiped,
            logged_in,
        }
    }

    pub fn with_tokens(tokens: AuthenticationResponse) -> Self {
        let store = Self::new();
        store.save_tokens(tokens);
        store
    }

    pub fn last_login_method(&self) -> Option<LoginMethod> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .login_method
    }

    /// Tracks whether a full token pair is currently held.
    pub fn is_logged_in(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    fn save_tokens(&self, tokens: AuthenticationResponse) {
        {
            let mut stored = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
            stored.access_token = Some(tokens.access_token);
            stored.refresh_token = Some(tokens.refresh_token);
            stored.login_method = Some(tokens.provider);
        }
        self.logged_in.send_replace(true);
    }

    fn wipe_tokens(&self) {
        {
            let mut stored = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
            stored.access_token = None;
            stored.refresh_token = None;
        }
        self.logged_in.send_replace(false);
        let _ = self.wiped.send(());
    }

    fn tokens_wiped(&self) -> broadcast::Receiver<()> {
        self.wiped.subscribe()
    }
}

// ---------------------------------------------------------------------------
// HTTP refresher
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchanges the stored refresh token at `base_url` + `path`.
///
/// The exchange itself is sent unauthenticated and is never retried. Any
/// failure wipes the store and notifies `refresh_failures` subscribers.
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    base_url: String,
    path: String,
    failures: broadcast::Sender<()>,
}

impl HttpTokenRefresher {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        base_url: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let (failures, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            store,
            base_url: base_url.into(),
            path: path.into(),
            failures,
        }
    }

    async fn exchange(&self) -> Result<AuthenticationResponse, ClientError> {
        let refresh_token = self.store.refresh_token().ok_or(ClientError::Unauthorized)?;
        let mut request = Endpoint::post(self.base_url.as_str(), self.path.as_str()).to_http_request()?;
        request.body = Some(
            serde_json::to_vec(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .map_err(ClientError::Serialization)?,
        );
        request.set_header("Content-Type", "application/json");
        request.set_header("Cache-Control", "no-cache");

        let response = self.transport.send(request).await?;
        decode_json(&response)
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<(), ClientError> {
        match self.exchange().await {
            Ok(tokens) => {
                tracing::debug!("token refresh succeeded");
                self.store.save_tokens(tokens);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed, wiping credentials");
                self.store.wipe_tokens();
                let _ = self.failures.send(());
                Err(err)
            }
        }
    }

    fn refresh_failures(&self) -> broadcast::Receiver<()> {
        self.failures.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Single-flight wrapper
// ---------------------------------------------------------------------------

/// Coalesces concurrent refreshes.
///
/// Callers that start waiting while another refresh is in flight return as
/// soon as it succeeds instead of refreshing again. After a failed refresh
/// the next waiter runs its own attempt.
pub struct SingleFlightRefresher<R> {
    inner: R,
    completed: AtomicU64,
    gate: Mutex<()>,
}

impl<R: TokenRefresher> SingleFlightRefresher<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            completed: AtomicU64::new(0),
            gate: Mutex::new(()),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: TokenRefresher> TokenRefresher for SingleFlightRefresher<R> {
    async fn refresh(&self) -> Result<(), ClientError> {
        let seen = self.completed.load(Ordering::Acquire);
        let _guard = self.gate.lock().await;
        if self.completed.load(Ordering::Acquire) != seen {
            tracing::debug!("joined an in-flight token refresh");
            return Ok(());
        }
        self.inner.refresh().await?;
        self.completed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn refresh_failures(&self) -> broadcast::Receiver<()> {
        self.inner.refresh_failures()
    }
}
