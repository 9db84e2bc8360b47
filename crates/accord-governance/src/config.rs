//! Engine configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use accord_core::IsolationLevel;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

const DEDUP_WINDOW_VAR: &str = "ACCORD_DEDUP_WINDOW_SECS";
pub(crate) const ISOLATION_LEVEL_VAR: &str = "ACCORD_ISOLATION_LEVEL";
const CLOCK_SOURCE_VAR: &str = "ACCORD_CLOCK_SOURCE";
const STORE_TIMEOUT_VAR: &str = "ACCORD_STORE_TIMEOUT_MS";

/// Longer windows are clamped to a century.
const MAX_DEDUP_WINDOW_SECS: u64 = 100 * 365 * 86_400;

/// Where case ids and record dates take their time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// The system wall clock.
    #[default]
    Wall,
    /// A clock supplied by the embedder.
    Injected,
}

impl ClockSource {
    /// Configuration literal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wall => "wall",
            Self::Injected => "injected",
        }
    }
}

impl FromStr for ClockSource {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wall" => Ok(Self::Wall),
            "injected" => Ok(Self::Injected),
            _ => Err(GovernanceError::ConfigInvalid {
                var: CLOCK_SOURCE_VAR.to_string(),
                reason: format!("Unknown clock source: {s}"),
            }),
        }
    }
}

fn default_dedup_window_secs() -> u64 {
    86_400
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

/// Tunables of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Horizon of the ticket deduplication check. `0` disables the check.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Isolation level requested from relational stores.
    #[serde(default)]
    pub isolation_level: IsolationLevel,

    /// Source of case ids and record dates.
    #[serde(default)]
    pub clock_source: ClockSource,

    /// Upper bound of a single store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            isolation_level: IsolationLevel::default(),
            clock_source: ClockSource::default(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `ACCORD_DEDUP_WINDOW_SECS`: deduplication horizon (default: 86400)
    /// - `ACCORD_ISOLATION_LEVEL`: `read_committed`, `repeatable_read`, `serializable` (default)
    /// - `ACCORD_CLOCK_SOURCE`: `wall` (default) or `injected`
    /// - `ACCORD_STORE_TIMEOUT_MS`: per-call store timeout (default: 5000)
    ///
    /// # Errors
    ///
    /// Returns `GovernanceError::ConfigInvalid` if a variable is set to an
    /// unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let dedup_window_secs = match lookup(DEDUP_WINDOW_VAR) {
            Some(v) => parse_u64(DEDUP_WINDOW_VAR, &v)?,
            None => defaults.dedup_window_secs,
        };

        let isolation_level = match lookup(ISOLATION_LEVEL_VAR) {
            Some(v) => v
                .parse::<IsolationLevel>()
                .map_err(|e| GovernanceError::ConfigInvalid {
                    var: ISOLATION_LEVEL_VAR.to_string(),
                    reason: e.to_string(),
                })?,
            None => defaults.isolation_level,
        };

        let clock_source = match lookup(CLOCK_SOURCE_VAR) {
            Some(v) => ClockSource::from_str(&v)?,
            None => defaults.clock_source,
        };

        let store_timeout_ms = match lookup(STORE_TIMEOUT_VAR) {
            Some(v) => parse_u64(STORE_TIMEOUT_VAR, &v)?,
            None => defaults.store_timeout_ms,
        };
        if store_timeout_ms == 0 {
            return Err(GovernanceError::ConfigInvalid {
                var: STORE_TIMEOUT_VAR.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            dedup_window_secs,
            isolation_level,
            clock_source,
            store_timeout_ms,
        })
    }

    /// Deduplication horizon.
    #[must_use]
    pub fn dedup_window(&self) -> chrono::Duration {
        let secs = self.dedup_window_secs.min(MAX_DEDUP_WINDOW_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or_default())
    }

    /// Per-call store timeout.
    #[must_use]
    pub fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }
}

fn parse_u64(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| GovernanceError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("{e}: {value}"),
        })
}
