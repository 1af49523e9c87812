//! Service configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "limits": {
//!     "ingest":       { "limit": 100, "window_seconds": 10.0 },
//!     "list_errors":  { "limit": 100, "window_seconds": 10.0 },
//!     "clear_errors": { "limit": 100, "window_seconds": 10.0 }
//!   },
//!   "policy": { "kind": "delta", "delta": 10.0 },
//!   "store":  { "kind": "sqlite", "path": "data.db" }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyPolicy, DEFAULT_DELTA, DEFAULT_THRESHOLD, DeltaPolicy, ThresholdPolicy};
use crate::clock::Clock;
use crate::limiter::SlidingWindowLimiter;
use crate::store::{ErrorSink, MemoryErrorStore, SqliteErrorStore, StoreError};

/// Default admissions per window for every protected operation.
pub const DEFAULT_LIMIT: usize = 100;

/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECONDS: f64 = 10.0;

/// Default SQLite database file.
pub const DEFAULT_DB_PATH: &str = "data.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Quota for one protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitConfig {
    pub limit: usize,
    pub window_seconds: f64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_seconds: DEFAULT_WINDOW_SECONDS,
        }
    }
}

impl LimitConfig {
    pub fn new(limit: usize, window_seconds: f64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.checked(name).map(|_| ())
    }

    fn checked(&self, name: &str) -> Result<(usize, Duration), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::invalid(
                format!("limits.{name}.limit"),
                "must be at least 1",
            ));
        }
        let window = self
            .window()
            .map_err(|reason| ConfigError::invalid(format!("limits.{name}.window_seconds"), reason))?;
        Ok((self.limit, window))
    }

    /// Window as a [`Duration`]; must be finite and positive.
    pub fn window(&self) -> Result<Duration, String> {
        match Duration::try_from_secs_f64(self.window_seconds) {
            Ok(window) if !window.is_zero() => Ok(window),
            Ok(_) => Err("must be positive".to_string()),
            Err(err) => Err(format!("{} ({err})", self.window_seconds)),
        }
    }

    /// Build a limiter on the system clock.
    pub fn build(&self, name: &str) -> Result<SlidingWindowLimiter, ConfigError> {
        let (limit, window) = self.checked(name)?;
        Ok(SlidingWindowLimiter::new(limit, window))
    }

    /// Build a limiter on an injected clock.
    pub fn build_with_clock(
        &self,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<SlidingWindowLimiter, ConfigError> {
        let (limit, window) = self.checked(name)?;
        Ok(SlidingWindowLimiter::with_clock(limit, window, clock))
    }
}

/// Independent quotas per protected operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub ingest: LimitConfig,
    pub list_errors: LimitConfig,
    pub clear_errors: LimitConfig,
}

impl LimitsConfig {
    /// Same quota for every operation.
    pub fn uniform(limit: LimitConfig) -> Self {
        Self {
            ingest: limit,
            list_errors: limit,
            clear_errors: limit,
        }
    }
}

/// Which anomaly policy to run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    Delta {
        #[serde(default = "default_delta")]
        delta: f64,
    },
    Threshold {
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_delta() -> f64 {
    DEFAULT_DELTA
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::Delta {
            delta: DEFAULT_DELTA,
        }
    }
}

impl PolicyConfig {
    pub fn build(&self) -> Box<dyn AnomalyPolicy> {
        match *self {
            Self::Delta { delta } => Box::new(DeltaPolicy::new(delta)),
            Self::Threshold { threshold } => Box::new(ThresholdPolicy::new(threshold)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Delta { delta } if !delta.is_finite() => {
                Err(ConfigError::invalid("policy.delta", "must be finite"))
            }
            Self::Threshold { threshold } if !threshold.is_finite() => {
                Err(ConfigError::invalid("policy.threshold", "must be finite"))
            }
            _ => Ok(()),
        }
    }
}

/// Where rejected raw strings are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite {
        #[serde(default = "default_db_path")]
        path: PathBuf,
    },
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

impl StoreConfig {
    pub fn open(&self) -> Result<Arc<dyn ErrorSink>, StoreError> {
        let store: Arc<dyn ErrorSink> = match self {
            Self::Memory => Arc::new(MemoryErrorStore::new()),
            Self::Sqlite { path } => Arc::new(SqliteErrorStore::open(path)?),
        };
        Ok(store)
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Memory => "memory".to_string(),
            Self::Sqlite { path } => format!("sqlite ({})", path.display()),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub limits: LimitsConfig,
    pub policy: PolicyConfig,
    pub store: StoreConfig,
}

impl ServiceConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.ingest.validate("ingest")?;
        self.limits.list_errors.validate("list_errors")?;
        self.limits.clear_errors.validate("clear_errors")?;
        self.policy.validate()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
