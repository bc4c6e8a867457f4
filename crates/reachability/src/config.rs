//! Run configuration passed explicitly into every orchestration run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::check::{CheckKind, CheckSet};
use crate::error::ConfigError;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const MAX_CONCURRENCY: usize = 30;

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 60_000;
const MAX_PING_SAMPLES: u32 = 20;

/// Per-operation timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTimeouts {
    pub connect_ms: u64,
    pub tls_ms: u64,
    pub ping_ms: u64,
    pub http_ms: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self { connect_ms: 3000, tls_ms: 5000, ping_ms: 3000, http_ms: 5000 }
    }
}

impl ProbeTimeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn tls(&self) -> Duration {
        Duration::from_millis(self.tls_ms)
    }

    pub fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }

    pub fn http(&self) -> Duration {
        Duration::from_millis(self.http_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout("connect", self.connect_ms)?;
        validate_timeout("tls", self.tls_ms)?;
        validate_timeout("ping", self.ping_ms)?;
        validate_timeout("http", self.http_ms)
    }
}

/// Settings for one orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub enabled_checks: CheckSet,
    /// Stop probing a target's remaining kinds after its first success
    pub fast_mode: bool,
    /// Probe fallback addresses even when the primary target is reachable
    pub always_check_fallbacks: bool,
    /// Number of targets probed at the same time (1..=30)
    pub concurrency: usize,
    /// Run the interference probe suite against each primary target
    pub censorship_checks: bool,
    pub timeouts: ProbeTimeouts,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            enabled_checks: [CheckKind::Ping, CheckKind::OverlayRtt, CheckKind::PortDefault].into(),
            fast_mode: false,
            always_check_fallbacks: false,
            concurrency: DEFAULT_CONCURRENCY,
            censorship_checks: false,
            timeouts: ProbeTimeouts::default(),
        }
    }
}

impl RunConfig {
    pub fn with_checks(mut self, checks: impl IntoIterator<Item = CheckKind>) -> Self {
        self.enabled_checks = checks.into_iter().collect();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn fast(mut self, fast_mode: bool) -> Self {
        self.fast_mode = fast_mode;
        self
    }

    pub fn always_check_fallbacks(mut self, always: bool) -> Self {
        self.always_check_fallbacks = always;
        self
    }

    pub fn with_censorship(mut self, enabled: bool) -> Self {
        self.censorship_checks = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.enabled_checks.is_empty() {
            return Err(ConfigError::NoChecksEnabled);
        }
        self.timeouts.validate()
    }
}

fn validate_timeout(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
        return Err(ConfigError::Timeout { name, value });
    }
    Ok(())
}

/// Validate the sample count for the multi-sample ping path
pub fn validate_ping_samples(samples: u32) -> Result<(), ConfigError> {
    if samples == 0 || samples > MAX_PING_SAMPLES {
        return Err(ConfigError::PingSamples(samples));
    }
    Ok(())
}
