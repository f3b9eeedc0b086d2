//! cache_purge tool implementation.
//!
//! Purges entries from the current generation by expiry or URL marker, or
//! drops every generation but the current one.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::Error;
use swcache_core::cache::REFRESH_RECORD_KEY;

use crate::tools::json_result;
use crate::worker::Worker;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete entries whose max-age has passed.
    #[serde(default)]
    pub expired: bool,

    /// Delete entries whose URL contains any of these substrings.
    /// An empty list means the configured stale markers.
    #[serde(default)]
    pub markers: Option<Vec<String>>,

    /// Delete every generation except the current one.
    #[serde(default)]
    pub other_generations: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,

    /// Generations deleted.
    pub generations: Vec<String>,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(worker: &Worker, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if !params.expired && params.markers.is_none() && !params.other_generations {
        return Err(Error::InvalidInput(
            "At least one of expired, markers, or other_generations must be specified".to_string(),
        )
        .into());
    }

    let Some(current) = worker.generations().current_generation().await? else {
        return json_result(&CachePurgeOutput { deleted: 0, generations: Vec::new() });
    };

    let mut deleted_total = 0u64;

    if params.expired {
        deleted_total += worker.db().purge_expired_entries(&current, worker.now_ms()).await?;
    }

    if let Some(markers) = params.markers {
        let markers = if markers.is_empty() { worker.policy().stale_markers().to_vec() } else { markers };
        deleted_total += worker.db().purge_entries_matching(&current, &markers).await?;
    }

    let generations = if params.other_generations {
        worker
            .generations()
            .prune_other_generations(current.name(), &[REFRESH_RECORD_KEY])
            .await?
    } else {
        Vec::new()
    };

    tracing::info!(deleted = deleted_total, generations = generations.len(), "cache purged");
    json_result(&CachePurgeOutput { deleted: deleted_total, generations })
}
