use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use pulse_api::error::PipelineError;
use pulse_api::record::{IngestRecord, LogEntry};
use pulse_api::util::now_ms;

use crate::archive::ColdArchiveWriter;
use crate::log::RecordLog;
use crate::signals::PipelineSignals;
use crate::sink::DurableSinkWriter;

/// Stream consumer — reads one shard of the log in fixed-size batches and
/// fans every decoded record out to the durable sink and the cold archive.
///
/// Delivery is at-least-once: a retried batch re-invokes both sinks for
/// records already written. The archive key scheme makes its re-write
/// idempotent; the durable sink may double-write unless dedup is enabled.
pub struct Dispatcher {
    log: Arc<RecordLog>,
    sink: Arc<DurableSinkWriter>,
    archive: Arc<ColdArchiveWriter>,
    signals: Arc<PipelineSignals>,
    batch_size: usize,
    max_attempts: u32,
    batch_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        log: Arc<RecordLog>,
        sink: Arc<DurableSinkWriter>,
        archive: Arc<ColdArchiveWriter>,
        signals: Arc<PipelineSignals>,
        batch_size: usize,
        max_attempts: u32,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            log,
            sink,
            archive,
            signals,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            batch_timeout,
        }
    }

    /// Consume one shard until shutdown. Starts at the latest position —
    /// no historical backfill on first activation.
    ///
    /// Batches run to completion before the next is read; shards are
    /// consumed by independent tasks with no shared mutable state.
    pub async fn run_shard(&self, shard: u32, mut shutdown: watch::Receiver<bool>) {
        let mut offset = self.log.latest(shard);
        let mut notify = self.log.subscribe(shard);
        self.signals.connection_opened();
        tracing::info!(shard, offset, "dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = self.log.read_from(shard, offset, self.batch_size).await;
            if batch.is_empty() {
                tokio::select! {
                    _ = notify.recv() => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            let first = batch[0].sequence;
            let next = batch[batch.len() - 1].sequence + 1;

            let mut done = false;
            for attempt in 1..=self.max_attempts {
                match tokio::time::timeout(self.batch_timeout, self.process_batch(&batch)).await {
                    Ok(Ok(processed)) => {
                        self.signals.records_processed(processed as u64);
                        tracing::debug!(shard, first, processed, "batch processed");
                        done = true;
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(shard, first, attempt, error = %e, "batch attempt failed");
                    }
                    Err(_) => {
                        tracing::warn!(shard, first, attempt, "batch attempt timed out");
                    }
                }
            }

            if !done {
                // Surfaced as a failed invocation; dead-lettering is the
                // caller's responsibility. The shard must keep moving.
                self.signals.batch_failed();
                tracing::error!(shard, first, to = next - 1, "batch failed, retries exhausted");
            }

            offset = next;
        }

        self.signals.connection_closed();
        tracing::info!(shard, "dispatcher stopped");
    }

    /// One batch attempt: decode everything, then fan out per record.
    ///
    /// Decode failures fail the whole batch — no per-record isolation.
    /// The two sink calls are independent and issued concurrently; a
    /// failure in one never rolls back the other. Archive failures don't
    /// fail the batch; durable-sink failures do.
    async fn process_batch(&self, batch: &[LogEntry]) -> Result<usize, PipelineError> {
        let mut decoded: Vec<(&LogEntry, IngestRecord)> = Vec::with_capacity(batch.len());
        for entry in batch {
            let record: IngestRecord = serde_json::from_slice(&entry.data).map_err(|e| {
                PipelineError::decode(format!("entry {}: {e}", entry.sequence))
            })?;
            decoded.push((entry, record));
        }

        let mut processed = 0;
        for (entry, record) in &decoded {
            let ts_ms = now_ms();
            let (sink_result, archive_result) = tokio::join!(
                self.sink.write(record, entry, ts_ms),
                self.archive.archive(entry, ts_ms),
            );

            if let Err(e) = archive_result {
                tracing::warn!(sequence = entry.sequence, error = %e, "archive write failed");
            }
            sink_result.map_err(|e| e.with_context(format!("entry {}", entry.sequence)))?;
            processed += 1;
        }
        Ok(processed)
    }
}
