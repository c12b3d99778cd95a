use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::pin::Pin;

use pulse_api::error::PipelineError;
use pulse_api::record::{AggregateRow, MeasurementPoint};
use pulse_api::storage::{AggregateQuery, MeasureStore};
use pulse_api::util::date_from_ms;

use super::aggregate_points;

/// File-backed store with append-only semantics — the long-retention tier.
///
/// On-disk layout:
/// ```text
/// {data_dir}/{YYYY-MM-DD}.jsonl
/// ```
/// One JSON point per line, one file per day. Points are only ever
/// appended, never updated.
pub struct FileMeasureStore {
    data_dir: PathBuf,
}

impl FileMeasureStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn do_append(&self, points: &[MeasurementPoint]) -> Result<(), PipelineError> {
        for point in points {
            let date = date_from_ms(point.ts_ms);
            let line = serde_json::to_string(point)
                .map_err(|e| PipelineError::store(format!("json serialize: {e}")))?;
            self.append_line(&line, &date)?;
        }
        Ok(())
    }

    fn append_line(&self, line: &str, date: &str) -> Result<(), PipelineError> {
        let path = self.data_dir.join(format!("{date}.jsonl"));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(format!("mkdir: {e}")))?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::io(format!("open {}: {e}", path.display())))?;
        writeln!(f, "{line}").map_err(|e| PipelineError::io(format!("write: {e}")))?;
        Ok(())
    }

    /// Scan all day files that may overlap `[from_ms, now]` and collect the
    /// points inside the window. Unparseable lines are skipped.
    fn scan(&self, from_ms: i64) -> Result<Vec<MeasurementPoint>, PipelineError> {
        let from_date = date_from_ms(from_ms);
        let mut result = Vec::new();

        let dir = match std::fs::read_dir(&self.data_dir) {
            Ok(d) => d,
            // No data written yet.
            Err(_) => return Ok(result),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in dir.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(date) = name.strip_suffix(".jsonl") else {
                continue;
            };
            // ISO dates compare lexicographically.
            if date >= from_date.as_str() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let file = match std::fs::File::open(&path) {
                Ok(f) => f,
                Err(_) => continue,
            };
            for line in std::io::BufReader::new(file).lines() {
                let Ok(line) = line else { continue };
                if line.is_empty() {
                    continue;
                }
                let Ok(point) = serde_json::from_str::<MeasurementPoint>(&line) else {
                    continue;
                };
                if point.ts_ms >= from_ms {
                    result.push(point);
                }
            }
        }

        Ok(result)
    }
}

impl MeasureStore for FileMeasureStore {
    fn append(
        &self,
        points: &[MeasurementPoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>> {
        let points = points.to_vec();
        Box::pin(async move { self.do_append(&points) })
    }

    fn aggregate(
        &self,
        query: AggregateQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateRow>, PipelineError>> + Send + '_>> {
        Box::pin(async move {
            let points = self.scan(query.from_ms)?;
            Ok(aggregate_points(points.iter(), &query))
        })
    }

    fn count_since(
        &self,
        from_ms: i64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PipelineError>> + Send + '_>> {
        Box::pin(async move { Ok(self.scan(from_ms)?.len() as u64) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, value: &str, ts_ms: i64) -> MeasurementPoint {
        MeasurementPoint {
            ts_ms,
            measure_name: name.into(),
            measure_value: value.into(),
            dimensions: vec![("source".into(), "sensor-1".into())],
        }
    }

    #[tokio::test]
    async fn append_then_scan_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMeasureStore::new(dir.path());
        store
            .append(&[point("temp", "20.0", 1_700_000_000_000)])
            .await
            .unwrap();
        assert_eq!(store.count_since(0).await.unwrap(), 1);
        let rows = store.aggregate(AggregateQuery::since(0)).await.unwrap();
        assert_eq!(rows[0].measure_name, "temp");
    }

    #[tokio::test]
    async fn missing_data_dir_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMeasureStore::new(dir.path().join("never-created"));
        assert_eq!(store.count_since(0).await.unwrap(), 0);
        assert!(store.aggregate(AggregateQuery::since(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_filter_applies_inside_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMeasureStore::new(dir.path());
        let day = 1_700_000_000_000;
        store
            .append(&[point("temp", "20.0", day), point("temp", "30.0", day + 60_000)])
            .await
            .unwrap();
        assert_eq!(store.count_since(day + 1).await.unwrap(), 1);
    }
}
