//! Install and activate hooks.

use std::fmt;

use serde::{Deserialize, Serialize};
use swcache_core::cache::{REFRESH_RECORD_KEY, RequestKey};
use swcache_core::{Error, GenerationHandle, Request, Response};

use super::Worker;

/// Where the worker is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker never takes control.
    Redundant,
}

impl LifecycleState {
    /// Only an activated worker intercepts requests.
    pub fn intercepts_fetch(self) -> bool {
        self == Self::Activated
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// What activation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ActivateReport {
    pub generation: String,
    /// Generations deleted by the prune pass.
    pub pruned: Vec<String>,
    /// Whether the refresh evaluation wiped and re-seeded.
    pub refreshed: bool,
    /// Open pages now controlled by the worker.
    pub clients: usize,
}

impl Worker {
    /// Fetch the static URL set and store it as a fresh current generation.
    ///
    /// All-or-nothing: a single failed or non-success fetch stores nothing and
    /// leaves the worker redundant.
    pub async fn install(&self) -> Result<GenerationHandle, Error> {
        self.set_lifecycle(LifecycleState::Installing);
        tracing::info!(urls = self.static_urls.len(), "installing worker; caching static assets");

        let result = match self.fetch_static_set().await {
            Ok(entries) => self.generations.install(entries).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(handle) => {
                tracing::info!(generation = %handle.name(), "static assets cached");
                self.set_lifecycle(LifecycleState::Installed);
            }
            Err(e) => {
                tracing::error!(error = %e, "worker install failed");
                self.set_lifecycle(LifecycleState::Redundant);
            }
        }
        result
    }

    /// Fetch every static URL. The first failure or non-success status aborts.
    pub(super) async fn fetch_static_set(&self) -> Result<Vec<(RequestKey, Response)>, Error> {
        let mut entries = Vec::with_capacity(self.static_urls.len());
        for url in &self.static_urls {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status)));
            }
            entries.push((RequestKey::new(&request, &self.vary_headers), response));
        }
        Ok(entries)
    }

    /// Drop every other generation, run the refresh evaluation and take
    /// control of open pages.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        match self.lifecycle() {
            LifecycleState::Installed | LifecycleState::Activated => {}
            state => return Err(Error::InvalidInput(format!("cannot activate a worker that is {state}"))),
        }
        self.set_lifecycle(LifecycleState::Activating);
        tracing::info!("activating worker");

        let current = self.generations.ensure_current_generation().await?;
        let pruned = match self
            .generations
            .prune_other_generations(current.name(), &[REFRESH_RECORD_KEY])
            .await
        {
            Ok(pruned) => pruned,
            Err(e) => {
                tracing::warn!(error = %e, "failed to prune old cache generations");
                Vec::new()
            }
        };

        let refreshed = self.perform_auto_refresh().await;
        let generation = match self.generations.current_generation().await {
            Ok(Some(handle)) => handle.name().to_string(),
            _ => current.name().to_string(),
        };

        self.set_lifecycle(LifecycleState::Activated);
        let clients = self.clients.count();
        tracing::info!(clients, generation = %generation, "worker activated; claiming clients");

        Ok(ActivateReport { generation, pruned, refreshed, clients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{T0, fixture, fixture_with};
    use swcache_core::AppConfig;

    #[tokio::test]
    async fn test_install_caches_every_static_url() {
        let config = AppConfig { static_urls: vec!["/".into(), "/offline".into()], ..Default::default() };
        let fx = fixture_with(config).await;

        let handle = fx.worker.install().await.unwrap();
        assert_eq!(fx.worker.lifecycle(), LifecycleState::Installed);
        assert_eq!(fx.worker.db().count_entries(&handle).await.unwrap(), 2);

        let urls: Vec<String> = fx
            .worker
            .db()
            .keys(&handle)
            .await
            .unwrap()
            .into_iter()
            .map(|key| key.url)
            .collect();
        assert!(urls.contains(&"http://localhost:5000/".to_string()));
        assert!(urls.contains(&"http://localhost:5000/offline".to_string()));
        assert_eq!(fx.worker.generations().last_wipe_timestamp().await, T0);
    }

    #[tokio::test]
    async fn test_install_failure_leaves_no_current_generation() {
        let config = AppConfig { static_urls: vec!["/".into(), "/offline".into()], ..Default::default() };
        let fx = fixture_with(config).await;
        fx.network.fail("/offline");

        let result = fx.worker.install().await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert_eq!(fx.worker.lifecycle(), LifecycleState::Redundant);
        assert!(fx.worker.generations().current_generation().await.unwrap().is_none());
        assert!(fx.worker.generations().generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let config = AppConfig {
            static_urls: vec!["/".into(), "/missing".into()],
            offline_url: "/".into(),
            ..Default::default()
        };
        let fx = fixture_with(config).await;

        let result = fx.worker.install().await;
        assert!(matches!(result, Err(Error::InstallFailed(msg)) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let fx = fixture().await;
        assert!(matches!(fx.worker.activate().await, Err(Error::InvalidInput(_))));
        assert_eq!(fx.worker.lifecycle(), LifecycleState::Parsed);
    }

    #[tokio::test]
    async fn test_activate_prunes_old_generations() {
        let fx = fixture().await;
        let db = fx.worker.db();
        db.open_generation("smart-split-pwa-v1", "smart-split-pwa", T0 - 10).await.unwrap();
        db.open_generation("smart-split-pwa-v0-lastCacheClear", "smart-split-pwa", T0 - 10).await.unwrap();
        db.open_generation("unrelated-v1", "unrelated", T0 - 10).await.unwrap();

        let installed = fx.worker.install().await.unwrap();
        let report = fx.worker.activate().await.unwrap();

        assert_eq!(report.pruned, vec!["smart-split-pwa-v1".to_string()]);
        assert!(!report.refreshed);
        assert_eq!(report.generation, installed.name());
        assert_eq!(fx.worker.lifecycle(), LifecycleState::Activated);

        let remaining = db.list_generations().await.unwrap();
        assert!(remaining.contains(&"smart-split-pwa-v0-lastCacheClear".to_string()));
        assert!(remaining.contains(&"unrelated-v1".to_string()));
    }

    #[tokio::test]
    async fn test_state_display() {
        assert_eq!(LifecycleState::Activated.to_string(), "activated");
        assert!(LifecycleState::Activated.intercepts_fetch());
        assert!(!LifecycleState::Installed.intercepts_fetch());
    }
}
