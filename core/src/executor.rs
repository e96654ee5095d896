//! Authenticated request execution with a single refresh-and-retry.
//!
//! # Design
//! Each call runs one linear pipeline:
//!
//! 1. Build the `HttpRequest` from the descriptor, attach the bearer token
//!    when authenticated, then the fixed and common headers.
//! 2. Send it through the injected `Transport` and classify the response.
//! 3. On `Unauthorized` only, ask the `TokenRefresher` for new tokens,
//!    rebuild the request from scratch (re-reading the store) and send it
//!    once more. The outcome of that second attempt is final.
//!
//! The executor holds no mutable state of its own, so one instance can serve
//! any number of concurrent calls. Concurrent 401s each trigger their own
//! refresh unless the refresher coalesces them (see `SingleFlightRefresher`).

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::{TokenRefresher, TokenStore};
use crate::config::ExecutorConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse};
use crate::response::{decode_empty, decode_json};
use crate::transport::Transport;

type Decoder<T> = fn(&HttpResponse) -> Result<T, ClientError>;

/// Executes `RequestDescriptor`s against a `Transport`.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    token_store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    config: ExecutorConfig,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        token_store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            transport,
            token_store,
            refresher,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Send `descriptor` and decode the response body as JSON into `T`.
    pub async fn execute<T, D>(&self, authenticated: bool, descriptor: &D) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        D: RequestDescriptor + ?Sized,
    {
        self.run(authenticated, descriptor, decode_json::<T>).await
    }

    /// Send `descriptor` and discard the response body.
    pub async fn execute_empty<D>(&self, authenticated: bool, descriptor: &D) -> Result<(), ClientError>
    where
        D: RequestDescriptor + ?Sized,
    {
        self.run(authenticated, descriptor, decode_empty).await
    }

    pub async fn execute_authenticated<T, D>(&self, descriptor: &D) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        D: RequestDescriptor + ?Sized,
    {
        self.execute(true, descriptor).await
    }

    pub async fn execute_empty_authenticated<D>(&self, descriptor: &D) -> Result<(), ClientError>
    where
        D: RequestDescriptor + ?Sized,
    {
        self.execute_empty(true, descriptor).await
    }

    async fn run<T, D>(
        &self,
        authenticated: bool,
        descriptor: &D,
        decode: Decoder<T>,
    ) -> Result<T, ClientError>
    where
        D: RequestDescriptor + ?Sized,
    {
        let request = self.prepare(authenticated, descriptor)?;
        match self.attempt(request, decode).await {
            Err(ClientError::Unauthorized) => {}
            outcome => return outcome,
        }

        tracing::info!(path = descriptor.path(), "unauthorized, refreshing tokens and retrying once");
        self.refresher.refresh().await?;

        let request = self.prepare(authenticated, descriptor)?;
        self.attempt(request, decode).await
    }

    async fn attempt<T>(&self, request: HttpRequest, decode: Decoder<T>) -> Result<T, ClientError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request).await?;
        tracing::debug!(status = response.status, "received response");
        decode(&response)
    }

    /// Build the wire request for one attempt.
    fn prepare<D>(&self, authenticated: bool, descriptor: &D) -> Result<HttpRequest, ClientError>
    where
        D: RequestDescriptor + ?Sized,
    {
        let mut request = descriptor.to_http_request()?;
        if authenticated {
            self.authorize(&mut request)?;
        }

        request.set_header("Content-Type", "application/json");
        request.set_header("Cache-Control", "no-cache");
        for (name, value) in &self.config.common_headers {
            request.set_header(name.as_str(), value.as_str());
        }
        Ok(request)
    }

    fn authorize(&self, request: &mut HttpRequest) -> Result<(), ClientError> {
        match (self.token_store.access_token(), self.token_store.refresh_token()) {
            (Some(access_token), Some(_)) => {
                request.set_header("Authorization", format!("Bearer {access_token}"));
                Ok(())
            }
            _ => {
                tracing::warn!("missing credentials, wiping token store");
                self.token_store.wipe_tokens();
                Err(ClientError::Unauthorized)
            }
        }
    }
}
