use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One position in the ordered log. `data` is opaque bytes — the log never
/// interprets them; only the dispatcher decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub shard: u32,
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// Decoded producer payload. Immutable after decode; decoded exactly once
/// per log position by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRecord {
    pub source: String,
    /// Metric name → raw value. Values stay untyped until the durable sink
    /// validates them; non-numeric values are diverted, not dropped.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Extra dimensions attached to every point built from this record.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
}

/// One time-series point, derived 1:1 from a `(metric, value)` pair.
///
/// `measure_value` is kept textual: validation (`parse::<f64>()`) happens at
/// the durable sink, and a rejected point must preserve its original content
/// on the way to quarantine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Assigned at processing time, not at log-append time.
    pub ts_ms: i64,
    pub measure_name: String,
    pub measure_value: String,
    pub dimensions: Vec<(String, String)>,
}

impl MeasurementPoint {
    /// Parse the measure value as a double. This is the sink's validation
    /// gate: failure means the point goes to quarantine.
    pub fn value_as_f64(&self) -> Option<f64> {
        self.measure_value.parse::<f64>().ok()
    }
}

/// One output row of the aggregation query, grouped by measure name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub measure_name: String,
    pub avg_value: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub count: u64,
}
