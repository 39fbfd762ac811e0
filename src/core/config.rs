//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BcqError, Result};

/// Full configuration for the resilience substrate and completion cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub breaker: BreakerConfig,
    pub limiter: LimiterConfig,
    pub bulkhead: BulkheadConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field missing or for a missing/absent file entirely.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| BcqError::io(path, e))?;
        let cfg: Self = toml::from_str(&raw)?;
        Ok(cfg)
    }

    /// Apply environment variable overrides, used for ad-hoc tuning in tests
    /// and CI without editing a config file.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("BCQ_BREAKER_FAILURE_THRESHOLD")
            && let Ok(n) = v.parse()
        {
            self.breaker.failure_threshold = n;
        }
        if let Ok(v) = env::var("BCQ_LIMITER_MAX_TOKENS")
            && let Ok(n) = v.parse()
        {
            self.limiter.max_tokens = n;
        }
        if let Ok(v) = env::var("BCQ_BULKHEAD_MAX_CONCURRENT")
            && let Ok(n) = v.parse()
        {
            self.bulkhead.max_concurrent = n;
        }
        self
    }
}

/// Circuit breaker thresholds (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_secs: u64,
    pub half_open_max_requests: u32,
    /// Defaults to `2 * open_timeout_secs`; `None` means "use the derived default".
    pub stale_attempt_timeout_secs: Option<u64>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_secs: 30,
            half_open_max_requests: 1,
            stale_attempt_timeout_secs: None,
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    #[must_use]
    pub fn stale_attempt_timeout(&self) -> Duration {
        Duration::from_secs(
            self.stale_attempt_timeout_secs
                .unwrap_or(self.open_timeout_secs.saturating_mul(2)),
        )
    }
}

/// Token-bucket rate limiter thresholds (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimiterConfig {
    pub max_tokens: f64,
    pub refill_rate_per_sec: f64,
    pub tokens_per_request: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 50.0,
            refill_rate_per_sec: 10.0,
            tokens_per_request: 1.0,
        }
    }
}

/// Bulkhead thresholds (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BulkheadConfig {
    pub max_concurrent: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Completion cache staleness/refresh thresholds (spec.md §4.6/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Explicit cache directory override. `None` defers to env/XDG resolution.
    pub dir: Option<PathBuf>,
    pub max_age_secs: u64,
    /// Whether `accounts` is a required section for staleness (open question,
    /// spec.md §9 — this crate's resolved default is `false`).
    pub accounts_required: bool,
    pub background_refresh_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_secs: 300,
            accounts_required: false,
            background_refresh_timeout_secs: 30,
        }
    }
}
