//! `overtemp parse`: decode raw readings offline, without a server.

use anyhow::{Result, bail};
use overtemp_core::{Ingestor, MemoryErrorStore, PolicyConfig, format_timestamp, parse};
use std::sync::Arc;

/// Parse each raw string; with `policy`, also run them through the detector in order.
pub fn run(raws: &[String], policy: Option<PolicyConfig>, json: bool) -> Result<()> {
    let ingestor = policy.map(|p| Ingestor::new(p.build(), Arc::new(MemoryErrorStore::new())));
    let mut failures = 0;

    for raw in raws {
        match parse(raw) {
            Ok(reading) => {
                let overtemp = ingestor
                    .as_ref()
                    .and_then(|i| i.ingest(raw).ok())
                    .map(|outcome| outcome.overtemp);
                if json {
                    let mut value = serde_json::to_value(&reading)?;
                    if let Some(overtemp) = overtemp {
                        value["overtemp"] = overtemp.into();
                    }
                    println!("{value}");
                } else {
                    let flag = match overtemp {
                        Some(true) => "  OVERTEMP",
                        _ => "",
                    };
                    println!(
                        "device {:>12}  {}  {:>8.2}{flag}",
                        reading.device_id,
                        format_timestamp(reading.timestamp_ms),
                        reading.temperature
                    );
                }
            }
            Err(err) => {
                failures += 1;
                if json {
                    println!(
                        "{}",
                        serde_json::json!({"raw": raw, "error": err.kind(), "detail": err.to_string()})
                    );
                } else {
                    eprintln!("{raw:?}: {} ({err})", err.kind());
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} reading(s) rejected", raws.len());
    }
    Ok(())
}
