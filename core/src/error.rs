//! Error types for the request executor.
//!
//! # Design
//! `Unauthorized` is the only variant the executor recovers from, and only
//! once per call. Every other variant is terminal for the call that produced
//! it. Failure statuses whose body matches the service's error shape become
//! `Api`; anything else in the failure band becomes `InvalidErrorBody`.

use serde::Deserialize;

/// Errors returned by `RequestExecutor` and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport produced no usable status.
    #[error("no response")]
    NoResponse,

    /// A 401 response, or missing credentials detected before sending.
    #[error("unauthorized")]
    Unauthorized,

    /// A success status whose body does not match the expected type.
    #[error("response body could not be decoded: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A failure status whose body is not a domain error body.
    #[error("error response body could not be decoded")]
    InvalidErrorBody,

    /// A failure status carrying a domain error body.
    #[error("HTTP {status}: {message}")]
    Api {
        message: String,
        status: u16,
        domain_code: Option<DomainErrorCode>,
    },

    /// A status outside every recognized band.
    #[error("unexpected HTTP status {status}")]
    Unknown { status: u16 },

    /// The descriptor's base URL and path do not form a valid URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Network, DNS or TLS failure reported by the transport or refresher.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(Box::new(err))
    }
}

/// Service-defined error codes carried in `domainCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainErrorCode {
    TrialExpired = 1,
    NotSubscribed = 2,
    AppRequiresUpdate = 3,
    DailyFreeUsageExceeded = 4,
    RateLimitExceeded = 5,
}

impl DomainErrorCode {
    /// Map a raw code, returning `None` for codes this client does not know.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(DomainErrorCode::TrialExpired),
            2 => Some(DomainErrorCode::NotSubscribed),
            3 => Some(DomainErrorCode::AppRequiresUpdate),
            4 => Some(DomainErrorCode::DailyFreeUsageExceeded),
            5 => Some(DomainErrorCode::RateLimitExceeded),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Structured failure payload returned by the service on 4xx/5xx.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(default, rename = "domainCode")]
    raw_domain_code: Option<i64>,
}

impl ErrorBody {
    pub fn domain_code(&self) -> Option<DomainErrorCode> {
        self.raw_domain_code.and_then(DomainErrorCode::from_code)
    }
}
