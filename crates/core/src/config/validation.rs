//! Checks run on a loaded `AppConfig` before the worker starts.

use crate::config::AppConfig;
use crate::policy::RefreshPolicy;
use thiserror::Error;

/// Why a configuration was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Reject configurations the worker cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `cache_prefix` or `user_agent` is empty
    /// - `offline_url` is not in `static_urls`
    /// - the resolved check interval is not strictly below the refresh interval
    /// - `timeout_ms` or `max_bytes` is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported scheme: {}", u.scheme()),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() }),
        }

        if self.cache_prefix.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_prefix".into(), reason: "must not be empty".into() });
        }

        if !self.offline_url.starts_with('/') {
            return Err(ConfigError::Invalid { field: "offline_url".into(), reason: "must be an absolute path".into() });
        }
        if !self.static_urls.iter().any(|u| u == &self.offline_url) {
            return Err(ConfigError::Missing {
                field: "static_urls".into(),
                hint: format!("add {} so the offline page is cached at install", self.offline_url),
            });
        }

        RefreshPolicy::from_config(self)?;

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must be at most 300000ms".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !self.stale_sweep_enabled && !self.stale_markers.is_empty() {
            tracing::debug!(
                markers = self.stale_markers.len(),
                "stale_markers set but stale_sweep_enabled is false; markers are ignored"
            );
        }

        Ok(())
    }
}
