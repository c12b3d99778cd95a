use std::future::Future;
use std::pin::Pin;

use crate::error::PipelineError;
use crate::record::{AggregateRow, MeasurementPoint};

/// Read-side selection for the aggregation pass. Filters are optional; a
/// plain `since` query covers every point from `from_ms` on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateQuery {
    pub from_ms: i64,
    /// Only points carrying this `source` dimension.
    pub source: Option<String>,
    /// Only this measure name.
    pub metric: Option<String>,
}

impl AggregateQuery {
    pub fn since(from_ms: i64) -> Self {
        Self {
            from_ms,
            ..Self::default()
        }
    }
}

/// Measurement store — the durable sink's backend.
///
/// The engine doesn't enumerate concrete implementations; a store is just
/// this trait. Appends are batched; reads are the fixed aggregation pass.
pub trait MeasureStore: Send + Sync {
    /// Append all points as one batch.
    fn append(
        &self,
        points: &[MeasurementPoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>>;

    /// Group the points selected by `query` by measure name and compute
    /// avg/max/min/count. Rows come back ordered by measure name ascending.
    fn aggregate(
        &self,
        query: AggregateQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AggregateRow>, PipelineError>> + Send + '_>>;

    /// Count points with `ts_ms >= from_ms`. Connectivity check for the
    /// health query.
    fn count_since(
        &self,
        from_ms: i64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PipelineError>> + Send + '_>>;
}

/// Object store — cold archive and quarantine backend.
///
/// `put` is a full overwrite: writing the same key with the same body twice
/// leaves the stored object unchanged, which is what makes archive retries
/// safe.
pub trait ObjectStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        body: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>>;

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, PipelineError>> + Send + '_>>;

    /// Keys under a prefix, unordered.
    fn list(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PipelineError>> + Send + '_>>;
}
