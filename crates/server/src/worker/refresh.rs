//! Generation refresh and the throttled policy passes.

use swcache_core::WorkerMessage;

use super::Worker;

const HOUR_MS: i64 = 60 * 60 * 1000;

impl Worker {
    /// Replace every generation with a freshly fetched one if the refresh
    /// interval has elapsed.
    ///
    /// The static set is fetched before anything is deleted. If any asset
    /// cannot be fetched the old generation stays current, the refresh record
    /// is left alone and the next check retries. Otherwise the old
    /// generations are deleted and the new one is committed together with the
    /// record in one transaction.
    ///
    /// Serialized by the refresh gate: a caller that waited behind an
    /// in-flight refresh re-reads the record it just wrote and returns
    /// `false`. Returns whether this call replaced the cache.
    pub async fn perform_auto_refresh(&self) -> bool {
        let _gate = self.refresh_gate.lock().await;

        let now = self.clock.now_ms();
        let last = self.generations.last_wipe_timestamp().await;
        tracing::debug!(
            hours_since_clear = (now - last) as f64 / HOUR_MS as f64,
            refresh_interval_ms = self.policy.refresh_interval_ms(),
            "evaluating cache refresh"
        );

        if !self.policy.is_wipe_due(now, last) {
            return false;
        }

        let entries = match self.fetch_static_set().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "refresh due but static assets unavailable; keeping current generation");
                return false;
            }
        };

        tracing::info!(last_clear = last, "refresh interval elapsed; clearing cache generations");
        if !self.generations.wipe_all().await {
            tracing::error!("cache wipe incomplete; leftovers are pruned after the new generation is committed");
        }

        let generation = match self.generations.install(entries).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "failed to commit refreshed generation");
                if let Err(e) = self.generations.ensure_current_generation().await {
                    tracing::error!(error = %e, "failed to reopen current generation after a failed refresh");
                }
                return false;
            }
        };

        if let Err(e) = self.generations.prune_other_generations(generation.name(), &[]).await {
            tracing::warn!(error = %e, "failed to prune leftover cache generations");
        }

        let timestamp = self.clock.now_ms();
        let delivered = self.clients.broadcast(&WorkerMessage::CacheCleared { timestamp });
        tracing::info!(generation = %generation.name(), delivered, "cache generation refreshed; notified clients");
        true
    }

    /// Run the refresh evaluation if the check throttle allows it.
    ///
    /// `None` means the throttle suppressed the check.
    pub(crate) async fn maybe_refresh(&self) -> Option<bool> {
        let now = self.clock.now_ms();
        if !self.state.try_begin_check(now, self.policy.check_interval_ms()) {
            return None;
        }
        tracing::debug!("performing periodic cache check");
        Some(self.perform_auto_refresh().await)
    }

    /// Run the stale sweep if it is enabled and its throttle allows it.
    pub(crate) async fn maybe_sweep(&self) -> Option<u64> {
        let interval = self.policy.sweep_interval_ms()?;
        if !self.state.try_begin_sweep(self.clock.now_ms(), interval) {
            return None;
        }
        Some(self.sweep_stale().await)
    }

    /// Delete cache-busted and expired entries from the current generation.
    pub async fn sweep_stale(&self) -> u64 {
        let Some(generation) = self.current_generation_logged().await else {
            return 0;
        };

        let mut deleted = 0;
        match self
            .db()
            .purge_entries_matching(&generation, self.policy.stale_markers())
            .await
        {
            Ok(count) => deleted += count,
            Err(e) => tracing::warn!(error = %e, "stale marker sweep failed"),
        }
        match self.db().purge_expired_entries(&generation, self.clock.now_ms()).await {
            Ok(count) => deleted += count,
            Err(e) => tracing::warn!(error = %e, "expired entry sweep failed"),
        }

        if deleted > 0 {
            tracing::info!(deleted, generation = %generation.name(), "stale cache entries cleaned up");
        }
        deleted
    }
}
