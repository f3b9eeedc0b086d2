//! Worker configuration.
//!
//! Values are layered with figment: `SW_CACHE_*` environment variables over
//! an optional TOML file named by `SW_CACHE_CONFIG_FILE`, over the defaults
//! below. Everything is validated once after extraction.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::policy::FetchStrategy;

mod validation;

pub use validation::ConfigError;

/// Named refresh tunings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyPreset {
    /// Refresh interval measured in days, no per-entry max-age.
    #[default]
    Conservative,
    /// Refresh interval measured in tens of minutes, with a per-entry max-age.
    Aggressive,
}

/// Settings for one worker: what it caches, how it refreshes, how it fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite file backing the cache store (`SW_CACHE_DB_PATH`).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the worker is installed for. Same-origin responses are "basic".
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Fixed prefix shared by every cache generation.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Static version token. When unset, generations are versioned by timestamp.
    #[serde(default)]
    pub cache_version: Option<String>,

    /// Path of the offline fallback page.
    #[serde(default = "default_offline_url")]
    pub offline_url: String,

    /// Paths fetched and stored at install time.
    #[serde(default = "default_static_urls")]
    pub static_urls: Vec<String>,

    /// Refresh tuning the interval overrides below apply on top of.
    #[serde(default)]
    pub preset: PolicyPreset,

    /// Cache-first or network-first for non-navigation requests. When unset,
    /// the preset decides.
    #[serde(default)]
    pub strategy: Option<FetchStrategy>,

    /// Overrides the preset's generation refresh interval.
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,

    /// Overrides the policy check throttle (default: refresh interval / 10).
    #[serde(default)]
    pub check_interval_ms: Option<u64>,

    /// Overrides the preset's per-entry max-age.
    #[serde(default)]
    pub entry_max_age_ms: Option<u64>,

    /// Whether the cache-busting marker sweep runs.
    #[serde(default = "default_true")]
    pub stale_sweep_enabled: bool,

    /// Throttle for the marker sweep (default: the check interval).
    #[serde(default)]
    pub stale_sweep_interval_ms: Option<u64>,

    /// URL substrings recognised as versioning noise.
    #[serde(default = "default_stale_markers")]
    pub stale_markers: Vec<String>,

    /// Request headers folded into the cache key.
    #[serde(default)]
    pub vary_headers: Vec<String>,

    /// User-Agent sent with network fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest response body accepted from the network.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./sw-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:5000".into()
}

fn default_cache_prefix() -> String {
    "smart-split-pwa".into()
}

fn default_offline_url() -> String {
    "/offline".into()
}

fn default_static_urls() -> Vec<String> {
    ["/", "/offline", "/static/css/style.css", "/static/js/app.js", "/static/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_stale_markers() -> Vec<String> {
    ["?v=", "&v=", "?_=", "&_=", "?t=", "&t=", "cache-bust"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "sw-cache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: None,
            offline_url: default_offline_url(),
            static_urls: default_static_urls(),
            preset: PolicyPreset::default(),
            strategy: None,
            refresh_interval_ms: None,
            check_interval_ms: None,
            entry_max_age_ms: None,
            stale_sweep_enabled: true,
            stale_sweep_interval_ms: None,
            stale_markers: default_stale_markers(),
            vary_headers: Vec::new(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// The fetch timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Merge the environment, the optional TOML file and the defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError::LoadFailed` when a source cannot be read or a value has
    /// the wrong type, otherwise whatever [`AppConfig::validate`] rejects.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SW_CACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SW_CACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config = figment
            .extract::<Self>()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
