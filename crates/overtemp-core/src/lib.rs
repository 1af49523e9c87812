//! # overtemp-core
//!
//! **Throttled telemetry ingestion with overtemperature detection.**
//!
//! `overtemp-core` turns raw device readings of the form
//! `device_id:timestamp_ms:'Temperature':temperature` into structured
//! [`Reading`]s, flags overtemperature events, and guards every entry point
//! with a [`SlidingWindowLimiter`].
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use overtemp_core::{DeltaPolicy, Ingestor, MemoryErrorStore};
//!
//! let store = Arc::new(MemoryErrorStore::new());
//! let ingestor = Ingestor::new(Box::new(DeltaPolicy::default()), store.clone());
//!
//! assert!(!ingestor.ingest("7:1000:'Temperature':70.0").unwrap().overtemp);
//! assert!(ingestor.ingest("7:2000:'Temperature':85.5").unwrap().overtemp);
//!
//! // Malformed input lands in the error store.
//! assert!(ingestor.ingest("garbage").is_err());
//! assert_eq!(store.entries(), vec!["garbage".to_string()]);
//! ```
//!
//! ## Architecture
//!
//! Limiter → Parser → Anomaly policy → Outcome
//!
//! Two anomaly policies share the [`AnomalyPolicy`] trait:
//! - **Delta** (default): a device is overtemperature when its reading jumps
//!   more than 10.0 above the previous reading for the same device.
//! - **Threshold**: any reading at or above a fixed threshold (default 90.0).
//!
//! Rejected raw strings are recorded in an [`ErrorSink`], either in memory or
//! in SQLite.

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod limiter;
pub mod store;
pub mod telemetry;

pub use anomaly::{
    AnomalyPolicy, DEFAULT_DELTA, DEFAULT_THRESHOLD, DeltaPolicy, ThresholdPolicy,
    format_timestamp, format_timestamp_in,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LimitConfig, LimitsConfig, PolicyConfig, ServiceConfig, StoreConfig};
pub use ingest::{IngestOutcome, Ingestor};
pub use limiter::SlidingWindowLimiter;
pub use store::{ErrorSink, MemoryErrorStore, SqliteErrorStore, StoreError};
pub use telemetry::{ParseError, Reading, TEMPERATURE_TAG, parse};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Nothing guarded in this crate can be left half-updated by a panic.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
