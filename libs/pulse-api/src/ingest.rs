use std::future::Future;
use std::pin::Pin;

use crate::error::PipelineError;

/// Producer-side seam of the ordered log: append an opaque payload and get
/// back its `(shard, sequence)` position. Records with the same source key
/// always land on the same shard.
pub trait LogProducer: Send + Sync {
    fn append(
        &self,
        source_key: &str,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(u32, u64), PipelineError>> + Send + '_>>;
}
