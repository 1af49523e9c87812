//! Overtemperature detection policies.
//!
//! Every policy implements [`AnomalyPolicy`], so the ingestion pipeline does
//! not care which one a deployment runs:
//!
//! - [`DeltaPolicy`] remembers the last temperature of each device and flags a
//!   reading that rises more than `delta` above it.
//! - [`ThresholdPolicy`] flags any reading at or above a fixed threshold.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{Local, TimeZone};

use crate::lock;
use crate::telemetry::Reading;

/// Default rise, in degrees, above the previous reading.
pub const DEFAULT_DELTA: f64 = 10.0;

/// Default absolute threshold, in degrees.
pub const DEFAULT_THRESHOLD: f64 = 90.0;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Decides whether a reading is an overtemperature event.
pub trait AnomalyPolicy: Send + Sync {
    /// Short identifier (e.g. `"delta"`).
    fn name(&self) -> &'static str;

    /// Evaluate one reading. May update policy state.
    fn evaluate(&self, reading: &Reading) -> bool;
}

/// Per-device rise detection.
pub struct DeltaPolicy {
    delta: f64,
    last_seen: Mutex<HashMap<i64, f64>>,
}

impl DeltaPolicy {
    pub fn new(delta: f64) -> Self {
        Self {
            delta,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Last recorded temperature for a device.
    pub fn last_temperature(&self, device_id: i64) -> Option<f64> {
        lock(&self.last_seen).get(&device_id).copied()
    }

    /// Number of devices seen so far.
    pub fn device_count(&self) -> usize {
        lock(&self.last_seen).len()
    }
}

impl Default for DeltaPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA)
    }
}

impl AnomalyPolicy for DeltaPolicy {
    fn name(&self) -> &'static str {
        "delta"
    }

    fn evaluate(&self, reading: &Reading) -> bool {
        // Swap in the new value first: the map is updated whatever the verdict.
        let previous = lock(&self.last_seen).insert(reading.device_id, reading.temperature);
        previous.is_some_and(|prev| reading.temperature - prev > self.delta)
    }
}

impl fmt::Debug for DeltaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaPolicy")
            .field("delta", &self.delta)
            .field("devices", &self.device_count())
            .finish()
    }
}

/// Fixed absolute threshold, inclusive.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    threshold: f64,
}

impl ThresholdPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl AnomalyPolicy for ThresholdPolicy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn evaluate(&self, reading: &Reading) -> bool {
        reading.temperature >= self.threshold
    }
}

/// Render epoch milliseconds as `YYYY/MM/DD HH:MM:SS` in local time.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    format_timestamp_in(timestamp_ms, &Local)
}

/// [`format_timestamp`] in an explicit time zone.
///
/// Values chrono cannot represent come back as the plain millisecond count.
pub fn format_timestamp_in<Tz>(timestamp_ms: u64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(|ms| tz.timestamp_millis_opt(ms).single())
        .map(|time| time.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}
