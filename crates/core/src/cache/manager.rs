//! Generation manager: keeps exactly one current generation per prefix.
//!
//! The current generation is whatever the registry's `current_generation`
//! entry names, as long as that generation still exists. Generation names are
//! `{prefix}-v{token}`, where the token is a static version string or the
//! creation time in milliseconds.

use std::sync::Arc;

use super::connection::CacheDb;
use super::generations::GenerationHandle;
use super::hash::RequestKey;
use super::{CURRENT_GENERATION_KEY, REFRESH_RECORD_KEY};
use crate::Error;
use crate::clock::Clock;
use crate::http::Response;

pub struct GenerationManager {
    db: CacheDb,
    prefix: String,
    version: Option<String>,
    clock: Arc<dyn Clock>,
}

impl GenerationManager {
    pub fn new(db: CacheDb, prefix: impl Into<String>, version: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self { db, prefix: prefix.into(), version, clock }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Name a generation created at `now_ms` would get.
    pub fn name_for(&self, now_ms: i64) -> String {
        match &self.version {
            Some(version) => format!("{}-v{}", self.prefix, version),
            None => format!("{}-v{}", self.prefix, now_ms),
        }
    }

    fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with("-v"))
    }

    /// Every stored generation carrying this manager's prefix.
    pub async fn generations(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .db
            .list_generations()
            .await?
            .into_iter()
            .filter(|name| self.owns(name))
            .collect())
    }

    /// The generation the registry points at, if it still exists.
    pub async fn current_generation(&self) -> Result<Option<GenerationHandle>, Error> {
        let Some(name) = self.db.get_registry(CURRENT_GENERATION_KEY).await? else {
            return Ok(None);
        };
        if self.db.generation_exists(&name).await? {
            Ok(Some(GenerationHandle::new(name)))
        } else {
            tracing::debug!(generation = %name, "registry points at a deleted generation");
            Ok(None)
        }
    }

    /// Return the current generation, creating one named for "now" if there is none.
    ///
    /// Calling this twice in a row yields the same generation.
    pub async fn ensure_current_generation(&self) -> Result<GenerationHandle, Error> {
        if let Some(handle) = self.current_generation().await? {
            return Ok(handle);
        }

        let now = self.clock.now_ms();
        let name = self.name_for(now);
        let handle = self.db.open_generation(&name, &self.prefix, now).await?;
        self.db.set_registry(CURRENT_GENERATION_KEY, &name, now).await?;
        tracing::info!(generation = %name, "opened current cache generation");
        Ok(handle)
    }

    /// Atomically create the generation for "now" holding `entries`, stamp
    /// the refresh record and make it current.
    pub async fn install(&self, entries: Vec<(RequestKey, Response)>) -> Result<GenerationHandle, Error> {
        let now = self.clock.now_ms();
        let name = self.name_for(now);
        let count = entries.len();
        let handle = self.db.install_generation(&name, &self.prefix, entries, now).await?;
        tracing::info!(generation = %name, entries = count, "installed cache generation");
        Ok(handle)
    }

    /// Delete every prefixed generation except `current` and any whose name
    /// contains one of `preserve`.
    ///
    /// Returns the deleted names. A failed deletion is logged and skipped.
    pub async fn prune_other_generations(&self, current: &str, preserve: &[&str]) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.generations().await? {
            if name == current || preserve.iter().any(|p| name.contains(p)) {
                continue;
            }
            match self.db.delete_generation(&name).await {
                Ok(true) => {
                    tracing::info!(generation = %name, "deleted old cache generation");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(generation = %name, error = %e, "failed to delete old cache generation"),
            }
        }
        Ok(deleted)
    }

    /// Delete every prefixed generation, the current one included.
    ///
    /// Callers must have the replacement contents in hand and commit them with
    /// [`install`](Self::install) straight afterwards.
    pub async fn wipe_all(&self) -> bool {
        let names = match self.generations().await {
            Ok(names) => names,
            Err(e) => {
                tracing::error!(error = %e, "failed to list cache generations for wipe");
                return false;
            }
        };

        let mut ok = true;
        for name in names {
            tracing::info!(generation = %name, "deleting cache generation for refresh");
            if let Err(e) = self.db.delete_generation(&name).await {
                tracing::error!(generation = %name, error = %e, "failed to delete cache generation");
                ok = false;
            }
        }

        if let Err(e) = self.db.clear_registry(CURRENT_GENERATION_KEY).await {
            tracing::error!(error = %e, "failed to clear current generation pointer");
            ok = false;
        }

        ok
    }

    /// Last full wipe time from the refresh record, or 0 if it cannot be read.
    pub async fn last_wipe_timestamp(&self) -> i64 {
        match self.read_refresh_record().await {
            Ok(Some(ts)) => ts,
            Ok(None) => 0,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read last cache clear time");
                0
            }
        }
    }

    async fn read_refresh_record(&self) -> Result<Option<i64>, Error> {
        let Some(handle) = self.current_generation().await? else {
            return Ok(None);
        };
        let entry = self
            .db
            .match_entry(&handle, &RequestKey::reserved(REFRESH_RECORD_KEY), self.clock.now_ms())
            .await?;
        match entry {
            Some(entry) => {
                let text = entry.response.body_text();
                text.trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| Error::CorruptEntry(format!("refresh record: {text:?}")))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http::Request;
    use url::Url;

    const T0: i64 = 1_700_000_000_000;

    fn entry(path: &str) -> (RequestKey, Response) {
        let url = format!("http://localhost{path}");
        let request = Request::get(Url::parse(&url).unwrap());
        (RequestKey::new(&request, &[]), Response::new(url, 200, path.as_bytes().to_vec()))
    }

    async fn manager(version: Option<&str>) -> (GenerationManager, ManualClock) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let clock = ManualClock::new(T0);
        let manager = GenerationManager::new(db, "app", version.map(String::from), Arc::new(clock.clone()));
        (manager, clock)
    }

    #[tokio::test]
    async fn test_name_for() {
        let (timestamped, _) = manager(None).await;
        assert_eq!(timestamped.name_for(T0), format!("app-v{T0}"));

        let (fixed, _) = manager(Some("3")).await;
        assert_eq!(fixed.name_for(T0), "app-v3");
    }

    #[tokio::test]
    async fn test_ensure_current_generation_idempotent() {
        let (manager, clock) = manager(None).await;
        let first = manager.ensure_current_generation().await.unwrap();
        clock.advance(10);
        let second = manager.ensure_current_generation().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.generations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_is_current() {
        let (manager, _) = manager(None).await;
        let handle = manager.install(vec![entry("/"), entry("/offline")]).await.unwrap();
        assert_eq!(manager.current_generation().await.unwrap(), Some(handle.clone()));
        assert_eq!(manager.db().count_entries(&handle).await.unwrap(), 2);
        assert_eq!(manager.last_wipe_timestamp().await, T0);
    }

    #[tokio::test]
    async fn test_prune_preserves_current_and_bookkeeping() {
        let (manager, _) = manager(None).await;
        let db = manager.db();
        db.open_generation("app-v1", "app", T0 - 3).await.unwrap();
        db.open_generation("app-v2-lastCacheClear", "app", T0 - 2).await.unwrap();
        db.open_generation("other-v1", "other", T0 - 1).await.unwrap();
        let current = manager.ensure_current_generation().await.unwrap();

        let deleted = manager
            .prune_other_generations(current.name(), &[REFRESH_RECORD_KEY])
            .await
            .unwrap();
        assert_eq!(deleted, vec!["app-v1".to_string()]);

        let remaining = db.list_generations().await.unwrap();
        assert!(remaining.contains(&current.name().to_string()));
        assert!(remaining.contains(&"app-v2-lastCacheClear".to_string()));
        assert!(remaining.contains(&"other-v1".to_string()));
    }

    #[tokio::test]
    async fn test_wipe_all_then_ensure_leaves_one() {
        let (manager, clock) = manager(None).await;
        manager.install(vec![entry("/")]).await.unwrap();
        manager.db().open_generation("app-v1", "app", T0 - 1).await.unwrap();
        manager.db().open_generation("other-v1", "other", T0 - 1).await.unwrap();

        assert!(manager.wipe_all().await);
        assert!(manager.current_generation().await.unwrap().is_none());
        assert!(manager.generations().await.unwrap().is_empty());
        assert_eq!(manager.db().list_generations().await.unwrap(), vec!["other-v1".to_string()]);

        clock.advance(1);
        let handle = manager.ensure_current_generation().await.unwrap();
        assert_eq!(manager.generations().await.unwrap(), vec![handle.name().to_string()]);
        assert_eq!(handle.name(), format!("app-v{}", T0 + 1));
    }

    #[tokio::test]
    async fn test_last_wipe_defaults_to_zero() {
        let (manager, _) = manager(None).await;
        assert_eq!(manager.last_wipe_timestamp().await, 0);
        manager.ensure_current_generation().await.unwrap();
        assert_eq!(manager.last_wipe_timestamp().await, 0);
    }

    #[tokio::test]
    async fn test_install_stamps_refresh_record() {
        let (manager, clock) = manager(None).await;
        clock.set(T0 + 42);
        manager.install(vec![entry("/")]).await.unwrap();
        assert_eq!(manager.last_wipe_timestamp().await, T0 + 42);
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_zero() {
        let (manager, _) = manager(None).await;
        let handle = manager.ensure_current_generation().await.unwrap();
        let record = Response::text(REFRESH_RECORD_KEY, "yesterday");
        manager
            .db()
            .put_entry(&handle, &RequestKey::reserved(REFRESH_RECORD_KEY), &record, T0, None)
            .await
            .unwrap();
        assert_eq!(manager.last_wipe_timestamp().await, 0);
    }
}
