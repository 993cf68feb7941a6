//! Synchronization layer configuration
//!
//! Timeout values are tuned against observed UI timing rather than derived,
//! so every one of them is overridable from a TOML file or the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::verifier::BackoffPolicy;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CAMPAIGN_E2E_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timeouts: TimeoutConfig,

    /// DOM poll cadence
    pub poll_interval_ms: u64,

    pub verifier: VerifierConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            poll_interval_ms: 25,
            verifier: VerifierConfig::default(),
        }
    }
}

/// Timeout budget class of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    /// Modal toggles, sub-tab switches
    Short,
    /// Navigation with a network round trip
    Medium,
    /// Multi-step flows
    Long,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub short_ms: u64,
    pub medium_ms: u64,
    pub long_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            short_ms: 3_000,
            medium_ms: 6_000,
            long_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn duration(&self, class: TimeoutClass) -> Duration {
        let ms = match class {
            TimeoutClass::Short => self.short_ms,
            TimeoutClass::Medium => self.medium_ms,
            TimeoutClass::Long => self.long_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Action verifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
    pub max_backoff_ms: u64,
    /// Upper bound on a single post-action check
    pub check_timeout_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 150,
            backoff_multiplier: 2,
            max_backoff_ms: 1_000,
            check_timeout_ms: 1_000,
        }
    }
}

impl VerifierConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_backoff_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl SyncConfig {
    /// Load configuration from file, falling back to defaults when absent,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> E2eResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CAMPAIGN_E2E_*` overrides read through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> E2eResult<Option<u64>> {
            let key = format!("{}{}", ENV_PREFIX, name);
            match lookup(&key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| E2eError::Config(format!("{}={:?}: {}", key, raw, e))),
                None => Ok(None),
            }
        };

        if let Some(v) = read("SHORT_TIMEOUT_MS")? {
            self.timeouts.short_ms = v;
        }
        if let Some(v) = read("MEDIUM_TIMEOUT_MS")? {
            self.timeouts.medium_ms = v;
        }
        if let Some(v) = read("LONG_TIMEOUT_MS")? {
            self.timeouts.long_ms = v;
        }
        if let Some(v) = read("POLL_INTERVAL_MS")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = read("MAX_ATTEMPTS")? {
            self.verifier.max_attempts = u32::try_from(v)
                .map_err(|_| E2eError::Config(format!("max attempts out of range: {}", v)))?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> E2eResult<()> {
        let t = &self.timeouts;
        if t.short_ms == 0 || t.medium_ms == 0 || t.long_ms == 0 {
            return Err(E2eError::Config("timeouts must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(E2eError::Config("poll interval must be positive".to_string()));
        }
        if self.poll_interval_ms >= t.short_ms {
            return Err(E2eError::Config(format!(
                "poll interval {} ms must be shorter than the short timeout {} ms",
                self.poll_interval_ms, t.short_ms
            )));
        }
        if self.verifier.max_attempts == 0 {
            return Err(E2eError::Config("max attempts must be at least 1".to_string()));
        }
        if self.verifier.check_timeout_ms == 0 {
            return Err(E2eError::Config("check timeout must be positive".to_string()));
        }
        if self.verifier.backoff_multiplier == 0 {
            return Err(E2eError::Config("backoff multiplier must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
