//! Engine configuration.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. TOML config file (`EngineConfig::load`)
//! 3. Environment variables (`FANRUN_*`)
//! 4. CLI arguments, applied by the caller through the `with_*` setters

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Default cap on concurrently running processes.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 200;
/// Default per-process timeout in seconds.
pub const DEFAULT_PER_PROCESS_TIMEOUT_SECS: f64 = 60.0;
/// Default readiness-wait period in seconds.
pub const DEFAULT_POLL_PERIOD_SECS: f64 = 0.5;
/// Default per-stream capture cap (512 KiB).
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 512 * 1024;

/// Longest readiness wait `poll(2)` accepts through a millisecond `u16`.
const MAX_POLL_PERIOD_MS: u64 = u16::MAX as u64;

/// Tunables for one [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of processes holding an unreaped pid at once.
    pub max_in_flight: usize,
    /// Per-process wall-clock budget in seconds. `0` disables it.
    pub per_process_timeout_secs: f64,
    /// Wall-clock budget for a whole `run()` in seconds. `0` disables it.
    pub aggregate_timeout_secs: f64,
    /// Upper bound on each readiness wait, in seconds.
    pub poll_period_secs: f64,
    /// Bytes kept per stream; anything beyond is read and discarded.
    pub max_buffered_bytes: usize,
    /// Emit per-tick loop diagnostics.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            per_process_timeout_secs: DEFAULT_PER_PROCESS_TIMEOUT_SECS,
            aggregate_timeout_secs: 0.0,
            poll_period_secs: DEFAULT_POLL_PERIOD_SECS,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            debug: false,
        }
    }
}

impl EngineConfig {
    /// Load a config file, layering it over the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FANRUN_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `FANRUN_*` overrides using `lookup` as the variable source.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            raw.trim().parse().map_or_else(
                |_| {
                    warn!(key, value = %raw, "Ignoring unparseable environment override");
                    None
                },
                Some,
            )
        }

        if let Some(n) = parsed("FANRUN_MAX_IN_FLIGHT", lookup("FANRUN_MAX_IN_FLIGHT")) {
            self.max_in_flight = n;
        }
        if let Some(secs) = parsed("FANRUN_TIMEOUT", lookup("FANRUN_TIMEOUT")) {
            self.per_process_timeout_secs = secs;
        }
        if let Some(secs) = parsed("FANRUN_GLOBAL_TIMEOUT", lookup("FANRUN_GLOBAL_TIMEOUT")) {
            self.aggregate_timeout_secs = secs;
        }
        if let Some(secs) = parsed("FANRUN_POLL_PERIOD", lookup("FANRUN_POLL_PERIOD")) {
            self.poll_period_secs = secs;
        }
        if let Some(n) = parsed("FANRUN_MAX_BUFFER", lookup("FANRUN_MAX_BUFFER")) {
            self.max_buffered_bytes = n;
        }
        if let Some(flag) = parsed("FANRUN_DEBUG", lookup("FANRUN_DEBUG")) {
            self.debug = flag;
        }
    }

    /// Reject values that cannot describe a duration.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("per_process_timeout_secs", self.per_process_timeout_secs),
            ("aggregate_timeout_secs", self.aggregate_timeout_secs),
            ("poll_period_secs", self.poll_period_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    #[must_use]
    pub const fn with_per_process_timeout_secs(mut self, secs: f64) -> Self {
        self.per_process_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_aggregate_timeout_secs(mut self, secs: f64) -> Self {
        self.aggregate_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_poll_period_secs(mut self, secs: f64) -> Self {
        self.poll_period_secs = secs;
        self
    }

    #[must_use]
    pub const fn with_max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.max_buffered_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// In-flight cap, never below one so a non-empty queue always drains.
    pub fn in_flight_cap(&self) -> usize {
        self.max_in_flight.max(1)
    }

    /// Per-process budget, `None` when disabled.
    pub fn per_process_timeout(&self) -> Option<Duration> {
        positive_duration(self.per_process_timeout_secs)
    }

    /// Whole-run budget, `None` when disabled.
    pub fn aggregate_timeout(&self) -> Option<Duration> {
        positive_duration(self.aggregate_timeout_secs)
    }

    /// Readiness-wait bound, clamped to what `poll(2)` can express here.
    pub fn poll_period(&self) -> Duration {
        let period = positive_duration(self.poll_period_secs).unwrap_or(Duration::ZERO);
        period.min(Duration::from_millis(MAX_POLL_PERIOD_MS))
    }
}

fn positive_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
