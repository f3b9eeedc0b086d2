//! cache_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::FetchStrategy;

use crate::tools::json_result;
use crate::worker::{LifecycleState, Worker};

/// Output from the cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    pub state: LifecycleState,
    pub current_generation: Option<String>,
    /// Every generation carrying the configured prefix.
    pub generations: Vec<String>,
    pub entries: u64,
    /// Last full wipe, milliseconds since the epoch (0 if never).
    pub last_cache_clear: i64,
    pub strategy: String,
    pub clients: usize,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let current = worker.generations().current_generation().await?;
    let entries = match &current {
        Some(handle) => worker.db().count_entries(handle).await?,
        None => 0,
    };
    let strategy = match worker.policy().strategy() {
        FetchStrategy::CacheFirst => "cache_first",
        FetchStrategy::NetworkFirst => "network_first",
    };

    json_result(&CacheStatusOutput {
        state: worker.lifecycle(),
        current_generation: current.map(|h| h.name().to_string()),
        generations: worker.generations().generations().await?,
        entries,
        last_cache_clear: worker.generations().last_wipe_timestamp().await,
        strategy: strategy.to_string(),
        clients: worker.clients().count(),
    })
}
