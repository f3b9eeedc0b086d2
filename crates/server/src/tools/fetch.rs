//! sw_fetch tool implementation.
//!
//! Hands one request to the worker's fetch hook and reports how it was
//! answered.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::{Error, Request, RequestMode};

use super::json_result;
use crate::error::ToolError;
use crate::worker::{FetchOutcome, ResponseSource, Worker};

/// Input parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL or a path resolved against the worker's origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin" (default), "no-cors" or "cors".
    #[serde(default)]
    pub mode: RequestMode,

    /// Request headers, e.g. {"accept": "text/html"}.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchToolOutput {
    /// "passthrough", "response" or "failed".
    pub outcome: String,
    pub source: Option<ResponseSource>,
    pub status: Option<u16>,
    pub kind: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl FetchToolOutput {
    fn from_outcome(outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Passthrough => Self::empty("passthrough"),
            FetchOutcome::Response { response, source } => Self {
                source: Some(source),
                status: Some(response.status),
                kind: Some(response.kind.as_str().to_string()),
                body: Some(response.body_text()),
                headers: response.headers,
                ..Self::empty("response")
            },
            FetchOutcome::Failed(e) => Self { error: Some(e.to_string()), ..Self::empty("failed") },
        }
    }

    fn empty(outcome: &str) -> Self {
        Self {
            outcome: outcome.to_string(),
            source: None,
            status: None,
            kind: None,
            headers: Vec::new(),
            body: None,
            error: None,
        }
    }
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &Worker, params: FetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    if params.method.is_empty() || !params.method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ToolError::InvalidInput(format!("invalid method: {:?}", params.method)).into());
    }

    let url = worker.resolve(&params.url)?;
    let mut request = Request::get(url).with_method(params.method.to_ascii_uppercase());
    request.mode = params.mode;
    for (name, value) in params.headers {
        request = request.with_header(name, value);
    }

    let start = std::time::Instant::now();
    let outcome = worker.handle_fetch(&request).await;
    tracing::debug!(
        url = %request.url,
        method = %request.method,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "fetch intercepted"
    );

    json_result(&FetchToolOutput::from_outcome(outcome))
}
