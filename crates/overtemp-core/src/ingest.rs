//! Ingestion pipeline: parse, record failures, evaluate.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyPolicy, format_timestamp};
use crate::store::ErrorSink;
use crate::telemetry::{ParseError, parse};

/// Result of ingesting one well-formed reading.
///
/// `device_id` and `formatted_time` are only set for overtemperature readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub overtemp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_time: Option<String>,
}

impl IngestOutcome {
    pub fn normal() -> Self {
        Self {
            overtemp: false,
            device_id: None,
            formatted_time: None,
        }
    }

    pub fn overtemp(device_id: i64, formatted_time: String) -> Self {
        Self {
            overtemp: true,
            device_id: Some(device_id),
            formatted_time: Some(formatted_time),
        }
    }
}

/// Parses raw readings, records rejects, and applies the active policy.
pub struct Ingestor {
    policy: Box<dyn AnomalyPolicy>,
    sink: Arc<dyn ErrorSink>,
}

impl Ingestor {
    pub fn new(policy: Box<dyn AnomalyPolicy>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> &dyn AnomalyPolicy {
        self.policy.as_ref()
    }

    pub fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    /// Ingest one raw telemetry string.
    ///
    /// A parse failure is appended to the error sink before it is returned;
    /// the policy only ever sees well-formed readings.
    pub fn ingest(&self, raw: &str) -> Result<IngestOutcome, ParseError> {
        let reading = parse(raw).inspect_err(|err| self.record_reject(raw, err))?;

        if !self.policy.evaluate(&reading) {
            return Ok(IngestOutcome::normal());
        }

        let formatted_time = format_timestamp(reading.timestamp_ms);
        info!(
            "overtemperature: device {} at {formatted_time} ({:.2}, {} policy)",
            reading.device_id,
            reading.temperature,
            self.policy.name()
        );
        Ok(IngestOutcome::overtemp(reading.device_id, formatted_time))
    }

    fn record_reject(&self, raw: &str, err: &ParseError) {
        debug!("rejected telemetry {raw:?}: {err}");
        // The parse error still reaches the caller if the store is down.
        if let Err(store_err) = self.sink.append(raw) {
            error!("failed to record rejected telemetry {raw:?}: {store_err}");
        }
    }
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{DeltaPolicy, ThresholdPolicy};
    use crate::store::{MemoryErrorStore, StoreError};
    use crate::telemetry::Reading;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts evaluations so tests can assert the policy was skipped.
    struct CountingPolicy {
        calls: AtomicUsize,
    }

    impl AnomalyPolicy for CountingPolicy {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn evaluate(&self, _reading: &Reading) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    /// A sink whose backend is always down.
    struct BrokenSink {
        attempts: Mutex<Vec<String>>,
    }

    impl ErrorSink for BrokenSink {
        fn append(&self, raw: &str) -> Result<(), StoreError> {
            self.attempts.lock().unwrap().push(raw.to_string());
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }

        fn list(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }

        fn clear_all(&self) -> Result<(), StoreError> {
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }
    }

    fn delta_ingestor() -> (Arc<MemoryErrorStore>, Ingestor) {
        let store = Arc::new(MemoryErrorStore::new());
        let ingestor = Ingestor::new(Box::new(DeltaPolicy::default()), store.clone());
        (store, ingestor)
    }

    #[test]
    fn normal_reading_has_no_details() {
        let (store, ingestor) = delta_ingestor();
        let outcome = ingestor.ingest("1:1000:'Temperature':20.0").unwrap();
        assert_eq!(outcome, IngestOutcome::normal());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn overtemp_carries_device_and_time() {
        let (_store, ingestor) = delta_ingestor();
        ingestor.ingest("5:1000:'Temperature':20.0").unwrap();
        let outcome = ingestor.ingest("5:1700000000000:'Temperature':30.5").unwrap();
        assert!(outcome.overtemp);
        assert_eq!(outcome.device_id, Some(5));
        assert_eq!(
            outcome.formatted_time,
            Some(format_timestamp(1_700_000_000_000))
        );
    }

    #[test]
    fn every_failure_is_recorded_once() {
        let (store, ingestor) = delta_ingestor();
        let bad = ["1:2:3", "1:2:3:4:5", "1:2:Temperature:4", "x:2:'Temperature':4", ""];
        for (i, raw) in bad.iter().enumerate() {
            assert!(ingestor.ingest(raw).is_err());
            assert_eq!(store.entries().len(), i + 1);
            assert_eq!(store.entries()[i], *raw);
        }
        ingestor.ingest("1:2:'Temperature':4").unwrap();
        assert_eq!(store.entries().len(), bad.len());
    }

    #[test]
    fn policy_is_not_invoked_on_parse_failure() {
        let policy = Arc::new(CountingPolicy {
            calls: AtomicUsize::new(0),
        });

        struct Shared(Arc<CountingPolicy>);
        impl AnomalyPolicy for Shared {
            fn name(&self) -> &'static str {
                self.0.name()
            }
            fn evaluate(&self, reading: &Reading) -> bool {
                self.0.evaluate(reading)
            }
        }

        let ingestor = Ingestor::new(
            Box::new(Shared(policy.clone())),
            Arc::new(MemoryErrorStore::new()),
        );
        ingestor.ingest("bad").unwrap_err();
        ingestor.ingest("1:1:'Temperature':1").unwrap();
        ingestor.ingest("1:1:Temperature:1").unwrap_err();
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_parse_does_not_touch_device_state() {
        let store = Arc::new(MemoryErrorStore::new());
        let ingestor = Ingestor::new(Box::new(DeltaPolicy::default()), store);
        ingestor.ingest("3:1:'Temperature':50.0").unwrap();
        ingestor.ingest("3:1:'Temperature':hot").unwrap_err();
        assert!(ingestor.ingest("3:1:'Temperature':60.5").unwrap().overtemp);
    }

    #[test]
    fn store_failure_does_not_mask_parse_error() {
        let sink = Arc::new(BrokenSink {
            attempts: Mutex::new(Vec::new()),
        });
        let ingestor = Ingestor::new(Box::new(ThresholdPolicy::default()), sink.clone());
        let err = ingestor.ingest("1:2").unwrap_err();
        assert_eq!(err, ParseError::MalformedField { found: 2 });
        assert_eq!(*sink.attempts.lock().unwrap(), vec!["1:2".to_string()]);
    }

    #[test]
    fn threshold_ingestor_flags_hot_first_reading() {
        let store = Arc::new(MemoryErrorStore::new());
        let ingestor = Ingestor::new(Box::new(ThresholdPolicy::default()), store);
        let outcome = ingestor.ingest("8:0:'Temperature':90.0").unwrap();
        assert_eq!(outcome.device_id, Some(8));
        assert!(ingestor.ingest("8:0:'Temperature':89.0").unwrap() == IngestOutcome::normal());
    }

    #[test]
    fn outcome_serializes_only_relevant_fields() {
        let normal = serde_json::to_value(IngestOutcome::normal()).unwrap();
        assert_eq!(normal, serde_json::json!({"overtemp": false}));

        let hot = serde_json::to_value(IngestOutcome::overtemp(4, "1970/01/01 00:00:00".into()))
            .unwrap();
        assert_eq!(
            hot,
            serde_json::json!({
                "overtemp": true,
                "device_id": 4,
                "formatted_time": "1970/01/01 00:00:00",
            })
        );
    }
}
