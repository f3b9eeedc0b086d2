//! The fetch hook: request routing between cache, network and the offline page.
//!
//! ### Per request
//! 1. Not activated, or not a GET: pass through untouched.
//! 2. Throttled refresh check, then throttled stale sweep.
//! 3. Navigation: network, else the cached offline page.
//! 4. Anything else: cache-first or network-first, as configured.
//!
//! Writes back into the store never delay the response. A failed write only
//! means the response was served but not kept.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swcache_core::cache::RequestKey;
use swcache_core::{CacheDb, Clock, Error, FetchStrategy, GenerationHandle, Request, Response, ResponseKind};

use super::Worker;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

/// Result of intercepting one request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The worker did not handle the request; the host fetches it itself.
    Passthrough,
    Response { response: Response, source: ResponseSource },
    /// No response at all. Always `Error::Network`.
    Failed(Error),
}

impl FetchOutcome {
    fn network(response: Response) -> Self {
        Self::Response { response, source: ResponseSource::Network }
    }

    fn cache(response: Response) -> Self {
        Self::Response { response, source: ResponseSource::Cache }
    }
}

/// Only complete same-origin responses are kept.
fn is_cacheable(response: &Response) -> bool {
    response.status == 200 && response.kind == ResponseKind::Basic
}

impl Worker {
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.lifecycle().intercepts_fetch() || !request.is_get() {
            return FetchOutcome::Passthrough;
        }

        self.maybe_refresh().await;
        self.maybe_sweep().await;

        if request.is_navigation() {
            return self.navigate(request).await;
        }

        match self.policy.strategy() {
            FetchStrategy::CacheFirst => self.cache_first(request).await,
            FetchStrategy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Never serves a cached copy of the page itself, only the offline page.
    async fn navigate(&self, request: &Request) -> FetchOutcome {
        match self.network.fetch(request).await {
            Ok(response) => FetchOutcome::network(response),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "navigation failed; serving offline page");
                self.offline_fallback(e).await
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> FetchOutcome {
        let key = RequestKey::new(request, &self.vary_headers);
        let generation = self.current_generation_logged().await;

        if let Some(generation) = &generation
            && let Some(response) = self.lookup(generation, &key).await
        {
            return FetchOutcome::cache(response);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_cacheable(&response)
                    && let Some(generation) = generation
                {
                    self.store_in_background(generation, key, response.clone());
                }
                FetchOutcome::network(response)
            }
            Err(e) => self.fail_or_offline(request, e).await,
        }
    }

    async fn network_first(&self, request: &Request) -> FetchOutcome {
        let key = RequestKey::new(request, &self.vary_headers);

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_cacheable(&response) && !response.forbids_storage() {
                    match self.current_generation_logged().await {
                        Some(generation) => self.store_in_background(generation, key, response.clone()),
                        None => tracing::debug!(url = %request.url, "no current generation; response not cached"),
                    }
                }
                FetchOutcome::network(response)
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network failed; trying cache");
                if let Some(generation) = self.current_generation_logged().await
                    && let Some(response) = self.lookup(&generation, &key).await
                {
                    return FetchOutcome::cache(response);
                }
                let e = Error::Network(format!("no cached response available for {}: {e}", request.url));
                self.fail_or_offline(request, e).await
            }
        }
    }

    async fn lookup(&self, generation: &GenerationHandle, key: &RequestKey) -> Option<Response> {
        match self.db().match_entry(generation, key, self.clock.now_ms()).await {
            Ok(entry) => entry.map(|entry| entry.response),
            Err(e) => {
                tracing::warn!(url = %key.url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// HTML requests fall back to the offline page; everything else fails.
    async fn fail_or_offline(&self, request: &Request, error: Error) -> FetchOutcome {
        if request.accepts_html() {
            self.offline_fallback(error).await
        } else {
            FetchOutcome::Failed(error)
        }
    }

    async fn offline_fallback(&self, error: Error) -> FetchOutcome {
        match self.offline_page().await {
            Some(response) => FetchOutcome::Response { response, source: ResponseSource::OfflineFallback },
            None => FetchOutcome::Failed(error),
        }
    }

    /// Fire-and-forget write into `generation`, with expiry when the policy
    /// sets an entry max-age.
    fn store_in_background(&self, generation: GenerationHandle, key: RequestKey, response: Response) {
        let db = self.db().clone();
        let clock = self.clock.clone();
        let stored_at = clock.now_ms();
        let max_age_ms = self.policy.write_max_age_ms();
        let expires_at = max_age_ms.map(|age| stored_at + age);

        self.spawn_write(async move {
            if let Err(e) = db.put_entry(&generation, &key, &response, stored_at, expires_at).await {
                tracing::warn!(url = %key.url, error = %e, "failed to cache response");
                return;
            }
            tracing::debug!(url = %key.url, generation = %generation.name(), ?expires_at, "cached response");

            if let Some(age) = max_age_ms {
                schedule_expiry(db, clock, generation, key, age);
            }
        });
    }
}

/// Delete the entry once its max-age has passed, unless a newer write
/// extended it in the meantime.
fn schedule_expiry(db: CacheDb, clock: Arc<dyn Clock>, generation: GenerationHandle, key: RequestKey, age_ms: i64) {
    let delay = Duration::from_millis(u64::try_from(age_ms).unwrap_or(0));
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match db.delete_expired_entry(&generation, &key, clock.now_ms()).await {
            Ok(true) => tracing::debug!(url = %key.url, "expired cache entry deleted"),
            Ok(false) => {}
            Err(e) => tracing::debug!(url = %key.url, error = %e, "failed to delete expired cache entry"),
        }
    });
}
