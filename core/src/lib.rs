//! Authenticated HTTP request layer.
//!
//! # Overview
//! Turns declarative `RequestDescriptor`s into wire requests, sends them
//! through an injected `Transport`, classifies the response and decodes it.
//! When a call comes back `401 Unauthorized`, the executor refreshes the
//! tokens once and retries once before surfacing the error.
//!
//! # Design
//! - `RequestExecutor` is stateless between calls; tokens live behind the
//!   `TokenStore` trait and are re-read on every attempt.
//! - Token storage, refresh and the HTTP client are collaborators behind
//!   traits, with stock implementations (`InMemoryTokenStore`,
//!   `HttpTokenRefresher`, `ReqwestTransport`).
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`),
//!   so every stage can be tested without a network.

pub mod auth;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod http;
pub mod response;
pub mod transport;

pub use auth::{
    AuthenticationResponse, HttpTokenRefresher, InMemoryTokenStore, LoginMethod,
    SingleFlightRefresher, TokenRefresher, TokenStore,
};
pub use config::ExecutorConfig;
pub use descriptor::{build_http_request, Endpoint, ParamValue, RequestDescriptor};
pub use error::{ClientError, DomainErrorCode, ErrorBody};
pub use executor::RequestExecutor;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use response::{check_status, decode_empty, decode_json};
pub use transport::{ReqwestTransport, Transport};

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
