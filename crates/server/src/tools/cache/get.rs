//! cache_get tool implementation.
//!
//! Looks up the stored response for a request in the current generation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::cache::RequestKey;
use swcache_core::{Error, Request};

use crate::tools::json_result;
use crate::worker::Worker;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL or a path resolved against the worker's origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub generation: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub kind: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Milliseconds since the epoch.
    pub stored_at: i64,
    pub expires_at: Option<i64>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &Worker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let method = params.method.unwrap_or_else(|| "GET".into());
    let request = Request::get(url).with_method(method);
    let key = RequestKey::new(&request, worker.vary_headers());

    let generation = worker
        .generations()
        .current_generation()
        .await?
        .ok_or_else(|| Error::CacheMiss("no current generation".into()))?;

    let entry = worker
        .db()
        .match_entry(&generation, &key, worker.now_ms())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{} {}", key.method, key.url)))?;

    json_result(&CacheGetOutput {
        generation: generation.name().to_string(),
        method: entry.method,
        url: entry.url,
        status: entry.response.status,
        kind: entry.response.kind.as_str().to_string(),
        body: entry.response.body_text(),
        headers: entry.response.headers,
        stored_at: entry.stored_at,
        expires_at: entry.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_output;
    use crate::worker::testing::{T0, fixture};

    #[tokio::test]
    async fn test_get_impl_missing() {
        let fx = fixture().await.activated().await;
        let params = CacheGetParams { url: "/nope".into(), method: None };

        let err = get_impl(&fx.worker, params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }

    #[tokio::test]
    async fn test_get_impl_before_install() {
        let fx = fixture().await;
        let params = CacheGetParams { url: "/".into(), method: None };
        assert!(get_impl(&fx.worker, params).await.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let fx = fixture().await.activated().await;
        let params = CacheGetParams { url: "/offline".into(), method: Some("get".into()) };

        let output: CacheGetOutput = parse_output(&get_impl(&fx.worker, params).await.unwrap());
        assert_eq!(output.url, "http://localhost:5000/offline");
        assert_eq!(output.method, "GET");
        assert_eq!(output.status, 200);
        assert_eq!(output.kind, "basic");
        assert_eq!(output.body, "body of /offline");
        assert_eq!(output.stored_at, T0);
        assert_eq!(output.expires_at, None);
    }
}
