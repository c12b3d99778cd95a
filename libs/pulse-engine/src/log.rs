use std::collections::VecDeque;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};

use pulse_api::error::PipelineError;
use pulse_api::ingest::LogProducer;
use pulse_api::record::LogEntry;

/// One partition of the log: a bounded ring of entries with a monotonic
/// sequence counter and a notify channel for consumers that caught up.
struct Shard {
    entries: RwLock<VecDeque<LogEntry>>,
    next_seq: AtomicU64,
    notify_tx: broadcast::Sender<()>,
}

impl Shard {
    fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            notify_tx,
        }
    }
}

/// In-memory ordered, partitioned log.
///
/// Append-only per shard; entries are consumed by position. The ring bound
/// makes this a transport, not an archive — the cold archive is the durable
/// copy of every payload.
pub struct RecordLog {
    shards: Vec<Shard>,
    max_entries: usize,
}

impl RecordLog {
    pub fn new(shards: u32, max_entries: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Shard::new()).collect();
        Self { shards, max_entries }
    }

    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Shard for a source key. Same key, same shard — this is what gives
    /// per-source ordering.
    pub fn shard_for(&self, source_key: &str) -> u32 {
        let mut hasher = std::hash::DefaultHasher::new();
        source_key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as u32
    }

    /// Append an opaque payload; returns its `(shard, sequence)` position.
    pub async fn append(&self, source_key: &str, payload: Vec<u8>) -> (u32, u64) {
        let shard_id = self.shard_for(source_key);
        let shard = &self.shards[shard_id as usize];

        let mut entries = shard.entries.write().await;
        let sequence = shard.next_seq.fetch_add(1, Ordering::Relaxed);
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            shard: shard_id,
            sequence,
            data: payload,
        });
        drop(entries);

        // Notify consumers (ignore if none are waiting).
        let _ = shard.notify_tx.send(());
        (shard_id, sequence)
    }

    /// Read up to `max` entries with `sequence >= from_seq`, in log order.
    pub async fn read_from(&self, shard: u32, from_seq: u64, max: usize) -> Vec<LogEntry> {
        let Some(shard) = self.shards.get(shard as usize) else {
            return Vec::new();
        };
        let entries = shard.entries.read().await;
        entries
            .iter()
            .filter(|e| e.sequence >= from_seq)
            .take(max)
            .cloned()
            .collect()
    }

    /// The next sequence a fresh consumer should start at. First activation
    /// reads from here — no historical backfill.
    pub fn latest(&self, shard: u32) -> u64 {
        self.shards
            .get(shard as usize)
            .map(|s| s.next_seq.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Wake-up channel for a consumer that has caught up with the shard.
    pub fn subscribe(&self, shard: u32) -> broadcast::Receiver<()> {
        self.shards[shard as usize].notify_tx.subscribe()
    }
}

impl LogProducer for RecordLog {
    fn append(
        &self,
        source_key: &str,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(u32, u64), PipelineError>> + Send + '_>> {
        let source_key = source_key.to_string();
        Box::pin(async move { Ok(RecordLog::append(self, &source_key, payload).await) })
    }
}
