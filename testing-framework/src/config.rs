//! Harness configuration.
//!
//! Defaults can be overridden from the environment (see the `ENV_*` constants)
//! or from the `config:` block of a scenario file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Duration;

/// Poll interval override, in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "CHAINWATCH_POLL_INTERVAL_MS";
/// Wait timeout override, in milliseconds
pub const ENV_WAIT_TIMEOUT_MS: &str = "CHAINWATCH_WAIT_TIMEOUT_MS";
/// Directory where failure artifacts are written
pub const ENV_ARTIFACTS_DIR: &str = "CHAINWATCH_ARTIFACTS_DIR";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval and timeout used by a single condition wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between two evaluations of the probe
    pub poll_interval: Duration,
    /// Upper bound on the whole wait
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Same interval, different timeout
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Configuration of the listener harness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Default wait policy for call count assertions
    pub wait: WaitPolicy,
    /// Where to save failure artifacts (None disables saving)
    pub artifacts_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Create a config with defaults (100ms poll, 10s timeout, no artifacts)
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by any `CHAINWATCH_*` variables that are set
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is not a valid integer.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = read_env_millis(ENV_POLL_INTERVAL_MS)? {
            config.wait.poll_interval = ms;
        }
        if let Some(ms) = read_env_millis(ENV_WAIT_TIMEOUT_MS)? {
            config.wait.timeout = ms;
        }
        if let Ok(dir) = std::env::var(ENV_ARTIFACTS_DIR) {
            if !dir.is_empty() {
                config.artifacts_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(config)
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.wait.poll_interval = poll_interval;
        self
    }

    /// Set the wait timeout
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait.timeout = timeout;
        self
    }

    /// Save failure artifacts under `dir`
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Apply the overrides of a scenario `config:` block
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(ms) = overrides.poll_interval_ms {
            self.wait.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.wait_timeout_ms {
            self.wait.timeout = Duration::from_millis(ms);
        }
        if let Some(dir) = &overrides.artifacts_dir {
            self.artifacts_dir = Some(dir.clone());
        }
    }
}

/// Optional settings carried by a scenario file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Poll interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    /// Wait timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
    /// Failure artifact directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
}

fn read_env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) => {
            let ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of milliseconds, got '{}'", key, value))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
