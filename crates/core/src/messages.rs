//! Worker ⇄ page message protocol.
//!
//! Payloads are JSON objects discriminated by a `type` field:
//!
//! | direction | type | fields |
//! |---|---|---|
//! | worker→page | `CACHE_CLEARED` | `timestamp` |
//! | page→worker | `CHECK_CACHE_REFRESH` | none |
//! | worker→page | `CACHE_REFRESH_RESULT` | `refreshed`, `timestamp` |

use crate::Error;
use serde::{Deserialize, Serialize};

/// Messages the worker posts to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Broadcast after a full generation wipe.
    CacheCleared { timestamp: i64 },

    /// Reply to [`PageMessage::CheckCacheRefresh`].
    CacheRefreshResult { refreshed: bool, timestamp: i64 },
}

/// Messages pages send to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    CheckCacheRefresh,
}

impl PageMessage {
    /// Decode a raw payload. Anything unrecognised is a protocol error.
    pub fn parse(payload: &serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(payload.clone()).map_err(|e| Error::Protocol(e.to_string()))
    }
}
