use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use pulse_api::error::PipelineError;
use pulse_api::record::{AggregateRow, MeasurementPoint};
use pulse_api::storage::{AggregateQuery, MeasureStore};

use super::aggregate_points;

/// In-memory ring-buffer store — the recent window of the measurement
/// series. Old points fall off the front once `max_points` is reached;
/// long retention is the file tier's job.
pub struct MemoryMeasureStore {
    points: RwLock<VecDeque<MeasurementPoint>>,
    max_points: usize,
}

impl MemoryMeasureStore {
    pub fn new(max_points: usize) -> Self {
        Self {
            points: RwLock::new(VecDeque::with_capacity(max_points.min(65536))),
            max_points,
        }
    }
}

impl MeasureStore for MemoryMeasureStore {
    fn append(
        &self,
        points: &[MeasurementPoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>> {
        let points = points.to_vec();
        Box::pin(async move {
            let mut buf = self.points.write().await;
            for point in points {
                if buf.len() >= self.max_points {
                    buf.pop_front();
                }
                buf.push_back(point);
            }
            Ok(())
        })
    }

    fn aggregate(
        &self,
        query: AggregateQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateRow>, PipelineError>> + Send + '_>> {
        Box::pin(async move {
            let buf = self.points.read().await;
            Ok(aggregate_points(buf.iter(), &query))
        })
    }

    fn count_since(
        &self,
        from_ms: i64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PipelineError>> + Send + '_>> {
        Box::pin(async move {
            let buf = self.points.read().await;
            Ok(buf.iter().filter(|p| p.ts_ms >= from_ms).count() as u64)
        })
    }
}
