//! GraphQL wire types and per-call options

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request body sent to the GraphQL endpoint
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: &'a serde_json::Value,
    /// Always serialized as `null`; the operation is selected by the document
    #[serde(rename = "operationName")]
    pub operation_name: Option<&'a str>,
}

/// Entry of the `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    /// `extensions.code`, when the server supplied one
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

/// Response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}

/// Per-call options; unset values fall back to the transport configuration
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub dedupe: Option<bool>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = Some(dedupe);
        self
    }
}

/// Options after defaults have been applied
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub dedupe: bool,
}
