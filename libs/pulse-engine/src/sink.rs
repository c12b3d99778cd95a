use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use pulse_api::error::PipelineError;
use pulse_api::record::{IngestRecord, LogEntry, MeasurementPoint};
use pulse_api::storage::{MeasureStore, ObjectStore};
use pulse_api::util::date_path_from_ms;

/// Dimension values longer than this are dropped from the point (store
/// dimension limit, carried over from the original stack).
const MAX_DIMENSION_LEN: usize = 256;

/// Result of one durable-sink write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Points committed to the measure store.
    pub written: usize,
    /// Points diverted to quarantine after failing validation.
    pub diverted: usize,
    /// Points suppressed by the idempotency cache (dedup enabled only).
    pub suppressed: usize,
}

/// Bounded FIFO set of idempotency keys `{shard}:{sequence}:{metric}`.
///
/// Retention only needs to cover the log's redelivery window; once a key
/// ages out, a very late redelivery double-writes again, which is the
/// documented at-least-once behavior.
struct DedupCache {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl DedupCache {
    fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    fn insert(&mut self, key: String) {
        if self.seen.insert(key.clone()) {
            self.order.push_back(key);
            while self.order.len() > self.cap {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
    }
}

/// Durable sink — turns one decoded record into measurement points and
/// appends them as a single batch.
///
/// Validation is per point: a point whose value doesn't parse as a double
/// is written to quarantine instead of aborting the batch; the remaining
/// valid points still commit. Nothing is silently dropped.
pub struct DurableSinkWriter {
    store: Arc<dyn MeasureStore>,
    quarantine: Arc<dyn ObjectStore>,
    region: String,
    dedup: Option<Mutex<DedupCache>>,
}

impl DurableSinkWriter {
    /// `dedup_window` is the number of idempotency keys retained; 0 turns
    /// dedup off and keeps the at-least-once double-write observable.
    pub fn new(
        store: Arc<dyn MeasureStore>,
        quarantine: Arc<dyn ObjectStore>,
        region: impl Into<String>,
        dedup_window: usize,
    ) -> Self {
        Self {
            store,
            quarantine,
            region: region.into(),
            dedup: (dedup_window > 0).then(|| Mutex::new(DedupCache::new(dedup_window))),
        }
    }

    /// One point per `(metric, value)` pair; `ts_ms` is processing time.
    fn build_points(&self, record: &IngestRecord, ts_ms: i64) -> Vec<MeasurementPoint> {
        let mut dimensions = vec![
            ("source".to_string(), record.source.clone()),
            ("region".to_string(), self.region.clone()),
        ];
        for (name, value) in &record.relationships {
            if value.len() <= MAX_DIMENSION_LEN {
                dimensions.push((name.clone(), value.clone()));
            }
        }

        record
            .metrics
            .iter()
            .map(|(name, value)| MeasurementPoint {
                ts_ms,
                measure_name: name.clone(),
                measure_value: raw_value_text(value),
                dimensions: dimensions.clone(),
            })
            .collect()
    }

    /// Write all of a record's points; valid ones commit as one batch,
    /// invalid ones are diverted to quarantine.
    ///
    /// A store error after bounded transport retries surfaces here and
    /// fails the enclosing batch; quarantine writes for invalid points have
    /// already happened by then and are idempotent under batch retry.
    pub async fn write(
        &self,
        record: &IngestRecord,
        entry: &LogEntry,
        ts_ms: i64,
    ) -> Result<WriteOutcome, PipelineError> {
        let mut outcome = WriteOutcome::default();
        let mut valid: Vec<MeasurementPoint> = Vec::new();
        let mut keys: Vec<String> = Vec::new();

        for point in self.build_points(record, ts_ms) {
            if point.value_as_f64().is_none() {
                self.divert(&point, entry, ts_ms).await?;
                outcome.diverted += 1;
                continue;
            }

            let idem_key = format!("{}:{}:{}", entry.shard, entry.sequence, point.measure_name);
            if let Some(dedup) = &self.dedup {
                if dedup.lock().await.contains(&idem_key) {
                    outcome.suppressed += 1;
                    continue;
                }
            }
            valid.push(point);
            keys.push(idem_key);
        }

        if !valid.is_empty() {
            self.store
                .append(&valid)
                .await
                .map_err(|e| e.with_context("durable sink"))?;
            outcome.written = valid.len();

            if let Some(dedup) = &self.dedup {
                let mut dedup = dedup.lock().await;
                for key in keys {
                    dedup.insert(key);
                }
            }
        }

        tracing::debug!(
            sequence = entry.sequence,
            written = outcome.written,
            diverted = outcome.diverted,
            "durable sink write"
        );
        Ok(outcome)
    }

    /// Quarantine a rejected point with its original content preserved.
    async fn divert(
        &self,
        point: &MeasurementPoint,
        entry: &LogEntry,
        ts_ms: i64,
    ) -> Result<(), PipelineError> {
        let key = format!(
            "rejected-data/{}/{}-{}.json",
            date_path_from_ms(ts_ms),
            entry.sequence,
            point.measure_name,
        );
        let body = serde_json::to_vec(point)
            .map_err(|e| PipelineError::validation(format!("serialize rejected point: {e}")))?;
        self.quarantine
            .put(&key, &body)
            .await
            .map_err(|e| e.with_context("quarantine"))?;
        tracing::warn!(
            measure = %point.measure_name,
            value = %point.measure_value,
            key = %key,
            "non-numeric measurement diverted to quarantine"
        );
        Ok(())
    }
}

/// Textual form of a raw metric value, as validated by the store contract.
/// Strings keep their content (so `"21.5"` still parses as a double);
/// everything else uses its JSON rendering.
fn raw_value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::FsObjectStore;
    use crate::store::MemoryMeasureStore;

    fn record(json: &str) -> IngestRecord {
        serde_json::from_str(json).unwrap()
    }

    fn entry(sequence: u64) -> LogEntry {
        LogEntry {
            shard: 0,
            sequence,
            data: Vec::new(),
        }
    }

    fn sink_with(
        dir: &std::path::Path,
        dedup_window: usize,
    ) -> (DurableSinkWriter, Arc<MemoryMeasureStore>, Arc<FsObjectStore>) {
        let store = Arc::new(MemoryMeasureStore::new(1000));
        let quarantine = Arc::new(FsObjectStore::new(dir));
        let sink = DurableSinkWriter::new(store.clone(), quarantine.clone(), "local", dedup_window);
        (sink, store, quarantine)
    }

    #[tokio::test]
    async fn valid_points_commit_invalid_points_divert() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, store, quarantine) = sink_with(dir.path(), 0);

        let r = record(r#"{"source":"sensor-1","metrics":{"temp":21.5,"humidity":"bad"}}"#);
        let outcome = sink.write(&r, &entry(3), 0).await.unwrap();

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.diverted, 1);
        // written + diverted covers every (record, metric) pair.
        assert_eq!(outcome.written + outcome.diverted, r.metrics.len());

        assert_eq!(store.count_since(0).await.unwrap(), 1);
        let rejected = quarantine.list("rejected-data/").await.unwrap();
        assert_eq!(rejected, vec!["rejected-data/1970/01/01/3-humidity.json".to_string()]);

        // Original content preserved in quarantine.
        let body = quarantine.get(&rejected[0]).await.unwrap().unwrap();
        let point: MeasurementPoint = serde_json::from_slice(&body).unwrap();
        assert_eq!(point.measure_value, "bad");
    }

    #[tokio::test]
    async fn numeric_string_passes_the_double_gate() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, store, _) = sink_with(dir.path(), 0);

        let r = record(r#"{"source":"s","metrics":{"temp":"21.5"}}"#);
        let outcome = sink.write(&r, &entry(0), 0).await.unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(store.count_since(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn relationships_become_dimensions_with_length_cap() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _, _) = sink_with(dir.path(), 0);

        let mut r = record(r#"{"source":"s","metrics":{"temp":1}}"#);
        r.relationships.insert("rack".into(), "r-12".into());
        r.relationships.insert("oversize".into(), "x".repeat(300));

        let points = sink.build_points(&r, 0);
        let dims: Vec<&str> = points[0].dimensions.iter().map(|(k, _)| k.as_str()).collect();
        assert!(dims.contains(&"source"));
        assert!(dims.contains(&"region"));
        assert!(dims.contains(&"rack"));
        assert!(!dims.contains(&"oversize"));
    }

    #[tokio::test]
    async fn redelivery_double_writes_without_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, store, _) = sink_with(dir.path(), 0);

        let r = record(r#"{"source":"s","metrics":{"temp":1}}"#);
        sink.write(&r, &entry(5), 0).await.unwrap();
        sink.write(&r, &entry(5), 0).await.unwrap();
        // Known at-least-once gap: same log position written twice.
        assert_eq!(store.count_since(0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn redelivery_is_suppressed_with_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, store, _) = sink_with(dir.path(), 128);

        let r = record(r#"{"source":"s","metrics":{"temp":1}}"#);
        let first = sink.write(&r, &entry(5), 0).await.unwrap();
        let second = sink.write(&r, &entry(5), 0).await.unwrap();

        assert_eq!(first.written, 1);
        assert_eq!(second.written, 0);
        assert_eq!(second.suppressed, 1);
        assert_eq!(store.count_since(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dedup_cache_is_bounded() {
        let mut cache = DedupCache::new(2);
        cache.insert("a".into());
        cache.insert("b".into());
        cache.insert("c".into());
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }
}
