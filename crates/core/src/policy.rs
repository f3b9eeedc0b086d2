//! Refresh policy: when to wipe a generation, when to sweep, how long entries live.
//!
//! [`RefreshPolicy`] is the immutable tuning resolved from configuration.
//! [`PolicyState`] holds the in-memory throttle timestamps; it is owned by the
//! worker context and reset on every restart. The persisted half of the state
//! (the last wipe time) lives in the cache store, see
//! [`GenerationManager::last_wipe_timestamp`](crate::GenerationManager::last_wipe_timestamp).

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, ConfigError, PolicyPreset};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Lifetime given to network-first writes when no entry max-age is configured.
pub const DEFAULT_NETWORK_FIRST_MAX_AGE_MS: i64 = 5 * MINUTE_MS;

/// Retrieval strategy for non-navigation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Serve from cache when present, otherwise fetch and store.
    #[default]
    CacheFirst,
    /// Always try the network, storing self-expiring copies; cache is the fallback.
    NetworkFirst,
}

/// Resolved refresh tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    refresh_interval_ms: i64,
    check_interval_ms: i64,
    entry_max_age_ms: Option<i64>,
    sweep_interval_ms: Option<i64>,
    stale_markers: Vec<String>,
    strategy: FetchStrategy,
}

impl RefreshPolicy {
    /// Day-scale refresh, no per-entry max-age, cache-first.
    pub fn conservative() -> Self {
        Self::with_intervals(DAY_MS, None, FetchStrategy::CacheFirst)
    }

    /// Half-hour refresh with a five minute max-age on every write, network-first.
    pub fn aggressive() -> Self {
        Self::with_intervals(30 * MINUTE_MS, Some(5 * MINUTE_MS), FetchStrategy::NetworkFirst)
    }

    fn with_intervals(refresh_interval_ms: i64, entry_max_age_ms: Option<i64>, strategy: FetchStrategy) -> Self {
        let check_interval_ms = refresh_interval_ms / 10;
        Self {
            refresh_interval_ms,
            check_interval_ms,
            entry_max_age_ms,
            sweep_interval_ms: Some(check_interval_ms),
            stale_markers: Vec::new(),
            strategy,
        }
    }

    /// Resolve the preset and apply every override from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the refresh interval or max-age is not
    /// positive, or if the check interval is not strictly below the refresh interval.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let base = match config.preset {
            PolicyPreset::Conservative => Self::conservative(),
            PolicyPreset::Aggressive => Self::aggressive(),
        };

        let refresh_interval_ms = match config.refresh_interval_ms {
            Some(ms) => to_millis("refresh_interval_ms", ms)?,
            None => base.refresh_interval_ms,
        };
        if refresh_interval_ms <= 0 {
            return Err(ConfigError::Invalid {
                field: "refresh_interval_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        let check_interval_ms = match config.check_interval_ms {
            Some(ms) => to_millis("check_interval_ms", ms)?,
            None => refresh_interval_ms / 10,
        };
        if check_interval_ms >= refresh_interval_ms {
            return Err(ConfigError::Invalid {
                field: "check_interval_ms".into(),
                reason: format!("must be smaller than the refresh interval ({refresh_interval_ms}ms)"),
            });
        }

        let entry_max_age_ms = match config.entry_max_age_ms {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "entry_max_age_ms".into(),
                    reason: "must be greater than 0".into(),
                });
            }
            Some(ms) => Some(to_millis("entry_max_age_ms", ms)?),
            None => base.entry_max_age_ms,
        };

        let sweep_interval_ms = if config.stale_sweep_enabled {
            match config.stale_sweep_interval_ms {
                Some(ms) => Some(to_millis("stale_sweep_interval_ms", ms)?),
                None => Some(check_interval_ms),
            }
        } else {
            None
        };

        Ok(Self {
            refresh_interval_ms,
            check_interval_ms,
            entry_max_age_ms,
            sweep_interval_ms,
            stale_markers: config.stale_markers.clone(),
            strategy: config.strategy.unwrap_or(base.strategy),
        })
    }

    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_stale_markers(mut self, markers: Vec<String>) -> Self {
        self.stale_markers = markers;
        self
    }

    pub fn refresh_interval_ms(&self) -> i64 {
        self.refresh_interval_ms
    }

    pub fn check_interval_ms(&self) -> i64 {
        self.check_interval_ms
    }

    pub fn entry_max_age_ms(&self) -> Option<i64> {
        self.entry_max_age_ms
    }

    pub fn sweep_interval_ms(&self) -> Option<i64> {
        self.sweep_interval_ms
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// A full wipe is due once a whole refresh interval has elapsed.
    pub fn is_wipe_due(&self, now_ms: i64, last_wipe_ms: i64) -> bool {
        now_ms - last_wipe_ms >= self.refresh_interval_ms
    }

    /// Max-age applied to an entry written now, if any.
    ///
    /// Network-first writes always expire.
    pub fn write_max_age_ms(&self) -> Option<i64> {
        match self.strategy {
            FetchStrategy::NetworkFirst => Some(self.entry_max_age_ms.unwrap_or(DEFAULT_NETWORK_FIRST_MAX_AGE_MS)),
            FetchStrategy::CacheFirst => self.entry_max_age_ms,
        }
    }

    pub fn expires_at(&self, now_ms: i64) -> Option<i64> {
        self.write_max_age_ms().map(|age| now_ms + age)
    }

    /// Whether a URL carries one of the cache-busting markers.
    pub fn is_stale_url(&self, url: &str) -> bool {
        self.stale_markers.iter().any(|m| !m.is_empty() && url.contains(m.as_str()))
    }

    pub fn stale_markers(&self) -> &[String] {
        &self.stale_markers
    }
}

fn to_millis(field: &str, ms: u64) -> Result<i64, ConfigError> {
    i64::try_from(ms).map_err(|_| ConfigError::Invalid { field: field.into(), reason: "out of range".into() })
}

/// In-memory throttle timestamps, reset on every worker start.
#[derive(Debug, Default)]
pub struct PolicyState {
    last_policy_check: AtomicI64,
    last_cleanup: AtomicI64,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next policy check if more than `check_interval_ms` has passed.
    ///
    /// Only one of several concurrent callers wins the claim.
    pub fn try_begin_check(&self, now_ms: i64, check_interval_ms: i64) -> bool {
        claim(&self.last_policy_check, now_ms, check_interval_ms)
    }

    /// Claim the next stale sweep if more than `sweep_interval_ms` has passed.
    pub fn try_begin_sweep(&self, now_ms: i64, sweep_interval_ms: i64) -> bool {
        claim(&self.last_cleanup, now_ms, sweep_interval_ms)
    }

    pub fn last_policy_check(&self) -> i64 {
        self.last_policy_check.load(Ordering::SeqCst)
    }

    pub fn last_cleanup(&self) -> i64 {
        self.last_cleanup.load(Ordering::SeqCst)
    }
}

fn claim(slot: &AtomicI64, now_ms: i64, interval_ms: i64) -> bool {
    let last = slot.load(Ordering::SeqCst);
    if now_ms - last <= interval_ms {
        return false;
    }
    slot.compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}
