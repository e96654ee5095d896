//! Declarative request descriptions and their conversion into `HttpRequest`.
//!
//! # Design
//! A `RequestDescriptor` names one logical endpoint: base URL, path, method,
//! parameters and optional headers. The conversion into an `HttpRequest` is
//! a provided trait method backed by the free function `build_http_request`,
//! so custom descriptors can override it and still delegate to the shared
//! behavior.
//!
//! Parameters are a closed set of scalar kinds (`ParamValue`). `GET` and
//! `DELETE` render them as query items using their `Display` form; the body
//! methods serialize the whole map as one JSON object.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest};

/// A single request parameter.
///
/// Query items use the `Display` form. Floats print in Rust's shortest
/// round-trip form, so `1.0` renders as `1` and `0.5` as `0.5`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => f.write_str(s),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(n) => write!(f, "{n}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Description of one endpoint call before it becomes a wire request.
pub trait RequestDescriptor: Send + Sync {
    fn base_url(&self) -> &str;
    fn path(&self) -> &str;
    fn method(&self) -> HttpMethod;
    fn parameters(&self) -> &HashMap<String, ParamValue>;

    fn headers(&self) -> Option<&HashMap<String, String>> {
        None
    }

    fn to_http_request(&self) -> Result<HttpRequest, ClientError> {
        build_http_request(self)
    }
}

/// Shared conversion from a descriptor into an `HttpRequest`.
///
/// Fails when the base URL and path do not form a valid URL, or when the
/// path contains a `.` or `..` segment (percent-encoded forms included).
/// Those segments are rejected instead of being resolved or dropped. A body
/// that cannot be serialized is dropped with a warning rather than failing.
pub fn build_http_request<D>(descriptor: &D) -> Result<HttpRequest, ClientError>
where
    D: RequestDescriptor + ?Sized,
{
    let mut url = join_path(descriptor.base_url(), descriptor.path())?;
    let method = descriptor.method();
    let parameters = descriptor.parameters();

    let body = if method.uses_query() {
        if !parameters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in parameters {
                query.append_pair(name, &value.to_string());
            }
        }
        None
    } else {
        match serde_json::to_vec(parameters) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(path = descriptor.path(), error = %err, "dropping unserializable request body");
                None
            }
        }
    };

    let mut request = HttpRequest::new(method, url.to_string());
    request.body = body;
    if let Some(headers) = descriptor.headers() {
        for (name, value) in headers {
            request.set_header(name.as_str(), value.as_str());
        }
    }
    Ok(request)
}

/// Append `path` to the path of `base` segment by segment.
fn join_path(base: &str, path: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Ok(url);
    }
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(format!("{base}: cannot be a base")))?;
        segments.pop_if_empty();
        for segment in path.split('/') {
            if is_dot_segment(segment) {
                return Err(ClientError::InvalidUrl(format!("{path}: dot segment in path")));
            }
            segments.push(segment);
        }
    }
    Ok(url)
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        "." | ".." | "%2e" | "%2e%2e" | ".%2e" | "%2e."
    )
}

/// A plain descriptor value, assembled with builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    base_url: String,
    path: String,
    method: HttpMethod,
    parameters: HashMap<String, ParamValue>,
    headers: Option<HashMap<String, String>>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            method,
            parameters: HashMap::new(),
            headers: None,
        }
    }

    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, base_url, path)
    }

    pub fn post(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, base_url, path)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

impl RequestDescriptor for Endpoint {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn method(&self) -> HttpMethod {
        self.method
    }

    fn parameters(&self) -> &HashMap<String, ParamValue> {
        &self.parameters
    }

    fn headers(&self) -> Option<&HashMap<String, String>> {
        self.headers.as_ref()
    }
}
