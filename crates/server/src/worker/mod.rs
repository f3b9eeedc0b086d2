//! The offline cache worker.
//!
//! One [`Worker`] is built at startup and shared by every hook handler. It
//! owns the policy state, the generation manager, the network seam and the
//! registry of open pages. Every hook resolves or logs; nothing here panics
//! or lets a storage failure escape a handler.

mod interceptor;
mod lifecycle;
mod messages;
mod notifier;
mod push;
mod refresh;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swcache_client::{Network, canonicalize};
use swcache_core::cache::RequestKey;
use swcache_core::{
    AppConfig, CacheDb, Clock, Error, GenerationHandle, GenerationManager, PolicyState, RefreshPolicy, Request,
    Response,
};
use tokio::task::JoinSet;
use url::Url;

pub use interceptor::{FetchOutcome, ResponseSource};
pub use lifecycle::{ActivateReport, LifecycleState};
pub use notifier::{ClientId, ClientRegistry};
pub use push::{NotificationAction, PushNotification};

/// Process-wide worker context.
pub struct Worker {
    generations: GenerationManager,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    state: PolicyState,
    clients: ClientRegistry,
    lifecycle: Mutex<LifecycleState>,
    refresh_gate: tokio::sync::Mutex<()>,
    pending_writes: Mutex<JoinSet<()>>,
    origin: Url,
    offline_url: Url,
    static_urls: Vec<Url>,
    vary_headers: Vec<String>,
}

impl Worker {
    /// Build the worker from validated configuration.
    pub fn new(
        config: &AppConfig, db: CacheDb, network: Arc<dyn Network>, clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        let resolve = |path: &str| canonicalize(path, &origin).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")));

        let offline_url = resolve(&config.offline_url)?;
        let static_urls = config
            .static_urls
            .iter()
            .map(|path| resolve(path))
            .collect::<Result<Vec<_>, _>>()?;

        let policy = RefreshPolicy::from_config(config).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let generations =
            GenerationManager::new(db, config.cache_prefix.clone(), config.cache_version.clone(), clock.clone());

        tracing::debug!(
            refresh_interval_ms = policy.refresh_interval_ms(),
            check_interval_ms = policy.check_interval_ms(),
            entry_max_age_ms = ?policy.entry_max_age_ms(),
            strategy = ?policy.strategy(),
            "worker policy resolved"
        );

        Ok(Self {
            generations,
            network,
            clock,
            policy,
            state: PolicyState::new(),
            clients: ClientRegistry::new(),
            lifecycle: Mutex::new(LifecycleState::Parsed),
            refresh_gate: tokio::sync::Mutex::new(()),
            pending_writes: Mutex::new(JoinSet::new()),
            origin,
            offline_url,
            static_urls,
            vary_headers: config.vary_headers.clone(),
        })
    }

    pub fn db(&self) -> &CacheDb {
        self.generations.db()
    }

    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn vary_headers(&self) -> &[String] {
        &self.vary_headers
    }

    pub fn lifecycle(&self) -> LifecycleState {
        *lock(&self.lifecycle)
    }

    fn set_lifecycle(&self, next: LifecycleState) {
        let mut current = lock(&self.lifecycle);
        if *current != next {
            tracing::debug!(from = %*current, to = %next, "worker lifecycle transition");
            *current = next;
        }
    }

    /// Resolve a path or absolute URL against the worker's origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        canonicalize(input, &self.origin).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Current generation, logging rather than failing on storage errors.
    async fn current_generation_logged(&self) -> Option<GenerationHandle> {
        match self.generations.current_generation().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve current cache generation");
                None
            }
        }
    }

    /// The cached offline page from the current generation, if present.
    async fn offline_page(&self) -> Option<Response> {
        let generation = self.current_generation_logged().await?;
        let key = RequestKey::new(&Request::get(self.offline_url.clone()), &self.vary_headers);
        match self.db().match_entry(&generation, &key, self.now_ms()).await {
            Ok(Some(entry)) => Some(entry.response),
            Ok(None) => {
                tracing::warn!(url = %self.offline_url, "offline page missing from current generation");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read offline page");
                None
            }
        }
    }

    /// Run a store write without making the caller wait for it.
    fn spawn_write<F>(&self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = lock(&self.pending_writes);
        while pending.try_join_next().is_some() {}
        pending.spawn(write);
    }

    /// Wait for every fire-and-forget write issued so far.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *lock(&self.pending_writes));
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background cache write did not complete");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
