//! Executor configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Settings applied to every request a `RequestExecutor` sends.
///
/// Deserializable so hosts can keep it alongside the rest of their settings:
///
/// ```json
/// { "common_headers": { "X-App-Version": "4.2.0" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Headers set after the fixed JSON and cache headers, so they can
    /// override them.
    #[serde(default)]
    pub common_headers: BTreeMap<String, String>,
}

impl ExecutorConfig {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_headers.insert(name.into(), value.into());
        self
    }
}
