use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pulse_api::error::PipelineError;
use pulse_api::record::{AggregateRow, MeasurementPoint};
use pulse_api::storage::{AggregateQuery, MeasureStore};

use crate::signals::PipelineSignals;

pub mod file;
pub mod memory;

pub use file::FileMeasureStore;
pub use memory::MemoryMeasureStore;

/// Group the points `query` selects by measure name; avg/max/min/count per
/// group. BTreeMap gives the measure-name ascending order the query
/// contract promises. Points whose value no longer parses are skipped —
/// only validated points reach a store, so this is a no-op in practice.
pub(crate) fn aggregate_points<'a, I>(points: I, query: &AggregateQuery) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = &'a MeasurementPoint>,
{
    struct Agg {
        sum: f64,
        max: f64,
        min: f64,
        count: u64,
    }

    let mut groups: BTreeMap<&str, Agg> = BTreeMap::new();
    for point in points {
        if point.ts_ms < query.from_ms {
            continue;
        }
        if let Some(metric) = &query.metric {
            if point.measure_name != *metric {
                continue;
            }
        }
        if let Some(source) = &query.source {
            if !point
                .dimensions
                .iter()
                .any(|(name, value)| name == "source" && value == source)
            {
                continue;
            }
        }
        let Some(value) = point.value_as_f64() else {
            continue;
        };
        groups
            .entry(point.measure_name.as_str())
            .and_modify(|a| {
                a.sum += value;
                a.max = a.max.max(value);
                a.min = a.min.min(value);
                a.count += 1;
            })
            .or_insert(Agg {
                sum: value,
                max: value,
                min: value,
                count: 1,
            });
    }

    groups
        .into_iter()
        .map(|(name, a)| AggregateRow {
            measure_name: name.to_string(),
            avg_value: a.sum / a.count as f64,
            max_value: a.max,
            min_value: a.min,
            count: a.count,
        })
        .collect()
}

/// Recent-window store backed by a long-retention store.
///
/// Appends fan out to both tiers; the aggregation read path only ever
/// touches the recent window. Transient append failures are retried with
/// bounded attempts before surfacing as a batch-level store error.
pub struct TieredMeasureStore {
    recent: Arc<dyn MeasureStore>,
    retention: Arc<dyn MeasureStore>,
    retry_attempts: u32,
    signals: Arc<PipelineSignals>,
}

impl TieredMeasureStore {
    pub fn new(
        recent: Arc<dyn MeasureStore>,
        retention: Arc<dyn MeasureStore>,
        retry_attempts: u32,
        signals: Arc<PipelineSignals>,
    ) -> Self {
        Self {
            recent,
            retention,
            retry_attempts: retry_attempts.max(1),
            signals,
        }
    }

    async fn append_with_retry(&self, points: &[MeasurementPoint]) -> Result<(), PipelineError> {
        let mut last_err = None;
        for attempt in 1..=self.retry_attempts {
            let result = async {
                self.recent.append(points).await?;
                self.retention.append(points).await
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.signals.store_throttled();
                    tracing::warn!(attempt, error = %e, "measure store append failed");
                    last_err = Some(e);
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| PipelineError::store("append failed"))
            .with_context("retries exhausted"))
    }
}

impl MeasureStore for TieredMeasureStore {
    fn append(
        &self,
        points: &[MeasurementPoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>> {
        let points = points.to_vec();
        Box::pin(async move { self.append_with_retry(&points).await })
    }

    fn aggregate(
        &self,
        query: AggregateQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateRow>, PipelineError>> + Send + '_>> {
        self.recent.aggregate(query)
    }

    fn count_since(
        &self,
        from_ms: i64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PipelineError>> + Send + '_>> {
        self.recent.count_since(from_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pulse_api::error::ErrorKind;

    use super::*;

    fn point(name: &str, value: &str, ts_ms: i64) -> MeasurementPoint {
        MeasurementPoint {
            ts_ms,
            measure_name: name.into(),
            measure_value: value.into(),
            dimensions: vec![("source".into(), "sensor-1".into())],
        }
    }

    /// Store whose next `failures_left` appends fail, then recovers.
    struct FlakyTier {
        inner: MemoryMeasureStore,
        failures_left: AtomicU32,
    }

    impl FlakyTier {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryMeasureStore::new(100),
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    impl MeasureStore for FlakyTier {
        fn append(
            &self,
            points: &[MeasurementPoint],
        ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Box::pin(async { Err(PipelineError::store("throttled")) });
            }
            self.inner.append(points)
        }

        fn aggregate(
            &self,
            query: AggregateQuery,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateRow>, PipelineError>> + Send + '_>>
        {
            self.inner.aggregate(query)
        }

        fn count_since(
            &self,
            from_ms: i64,
        ) -> Pin<Box<dyn Future<Output = Result<u64, PipelineError>> + Send + '_>> {
            self.inner.count_since(from_ms)
        }
    }

    #[test]
    fn aggregate_groups_and_orders_by_name() {
        let points = vec![
            point("temp", "20.0", 100),
            point("temp", "22.0", 200),
            point("humidity", "55.0", 150),
        ];
        let rows = aggregate_points(&points, &AggregateQuery::since(0));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].measure_name, "humidity");
        assert_eq!(rows[1].measure_name, "temp");
        assert_eq!(rows[1].avg_value, 21.0);
        assert_eq!(rows[1].max_value, 22.0);
        assert_eq!(rows[1].min_value, 20.0);
        assert_eq!(rows[1].count, 2);
    }

    #[test]
    fn aggregate_respects_window() {
        let points = vec![point("temp", "20.0", 100), point("temp", "40.0", 500)];
        let rows = aggregate_points(&points, &AggregateQuery::since(200));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[0].avg_value, 40.0);
    }

    #[test]
    fn metric_filter_narrows_to_one_measure() {
        let points = vec![point("temp", "20.0", 100), point("humidity", "55.0", 100)];
        let query = AggregateQuery {
            metric: Some("temp".into()),
            ..AggregateQuery::since(0)
        };
        let rows = aggregate_points(&points, &query);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].measure_name, "temp");
    }

    #[test]
    fn source_filter_matches_the_source_dimension() {
        let mut other = point("temp", "30.0", 100);
        other.dimensions = vec![("source".into(), "sensor-2".into())];
        let points = vec![point("temp", "20.0", 100), other];

        let query = AggregateQuery {
            source: Some("sensor-2".into()),
            ..AggregateQuery::since(0)
        };
        let rows = aggregate_points(&points, &query);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg_value, 30.0);
        assert_eq!(rows[0].count, 1);
    }

    #[tokio::test]
    async fn tiered_append_reaches_both_tiers() {
        let recent = Arc::new(MemoryMeasureStore::new(100));
        let retention = Arc::new(MemoryMeasureStore::new(100));
        let signals = Arc::new(PipelineSignals::default());
        let tiered = TieredMeasureStore::new(
            recent.clone(),
            retention.clone(),
            3,
            signals,
        );

        tiered.append(&[point("temp", "20.0", 100)]).await.unwrap();
        assert_eq!(recent.count_since(0).await.unwrap(), 1);
        assert_eq!(retention.count_since(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_append_failure_recovers_on_retry() {
        let recent = Arc::new(FlakyTier::new(1));
        let retention = Arc::new(MemoryMeasureStore::new(100));
        let signals = Arc::new(PipelineSignals::default());
        let tiered = TieredMeasureStore::new(
            recent.clone(),
            retention.clone(),
            3,
            signals.clone(),
        );

        tiered.append(&[point("temp", "20.0", 100)]).await.unwrap();
        assert_eq!(recent.count_since(0).await.unwrap(), 1);
        assert_eq!(retention.count_since(0).await.unwrap(), 1);
        // One failed attempt, one throttle signal.
        assert_eq!(signals.total_store_throttles(), 1);
    }

    #[tokio::test]
    async fn retry_exhaustion_surfaces_a_store_error() {
        let recent = Arc::new(FlakyTier::new(u32::MAX));
        let retention = Arc::new(MemoryMeasureStore::new(100));
        let signals = Arc::new(PipelineSignals::default());
        let tiered = TieredMeasureStore::new(recent, retention, 3, signals.clone());

        let err = tiered
            .append(&[point("temp", "20.0", 100)])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Store);
        assert!(err.message.contains("retries exhausted"));
        // Every bounded attempt bumped the throttle signal.
        assert_eq!(signals.total_store_throttles(), 3);
    }
}
