use std::sync::Arc;

use pulse_api::error::PipelineError;
use pulse_api::record::LogEntry;
use pulse_api::storage::ObjectStore;
use pulse_api::util::date_path_from_ms;

/// Cold archive — persists the raw, untransformed payload of every log
/// entry for replay and audit.
///
/// The key is unique per log position, so a redelivered entry overwrites
/// its own object with identical content: archive writes are naturally
/// idempotent under retry. No validation — archival accepts any payload.
pub struct ColdArchiveWriter {
    objects: Arc<dyn ObjectStore>,
}

impl ColdArchiveWriter {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// `raw-data/{YYYY/MM/DD}/{sequence}.json` — date from processing time.
    pub fn key_for(entry: &LogEntry, ts_ms: i64) -> String {
        format!("raw-data/{}/{}.json", date_path_from_ms(ts_ms), entry.sequence)
    }

    /// Write the entry's payload verbatim; returns the archive key.
    pub async fn archive(&self, entry: &LogEntry, ts_ms: i64) -> Result<String, PipelineError> {
        let key = Self::key_for(entry, ts_ms);
        self.objects
            .put(&key, &entry.data)
            .await
            .map_err(|e| e.with_context("archive"))?;
        tracing::debug!(key = %key, "archived raw payload");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::FsObjectStore;

    fn entry(sequence: u64, data: &[u8]) -> LogEntry {
        LogEntry {
            shard: 0,
            sequence,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn archives_payload_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::new(dir.path()));
        let writer = ColdArchiveWriter::new(objects.clone());

        let payload = br#"{"source":"sensor-1","metrics":{"temp":21.5}}"#;
        let key = writer.archive(&entry(42, payload), 0).await.unwrap();
        assert_eq!(key, "raw-data/1970/01/01/42.json");
        assert_eq!(objects.get(&key).await.unwrap().unwrap(), payload);
    }

    #[tokio::test]
    async fn rearchiving_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::new(dir.path()));
        let writer = ColdArchiveWriter::new(objects.clone());

        let e = entry(7, b"payload");
        let key = writer.archive(&e, 1_000).await.unwrap();
        let first = objects.get(&key).await.unwrap().unwrap();
        writer.archive(&e, 1_000).await.unwrap();
        let second = objects.get(&key).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(objects.list("raw-data/").await.unwrap().len(), 1);
    }
}
